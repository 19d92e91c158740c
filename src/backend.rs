// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 fetchcore contributors
//
// Concrete `RequestHandler` implementations (spec.md §4.6/§4.7). The
// filesystem backend is always built; the HTTP backend only for wasm32.

pub mod fs;

#[cfg(target_arch = "wasm32")]
pub mod http;
