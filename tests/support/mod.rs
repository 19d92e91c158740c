// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 fetchcore contributors
//
// Shared test fixture helpers.

/// Install the env-configured logger once per process. Safe to call from
/// every test - `try_init` is a no-op past the first call, including across
/// the several test binaries Cargo links for this crate's `tests/` files.
pub fn init_logging() {
    let _ = env_logger::try_init();
}
