// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 fetchcore contributors
//
// Compile-time capacity constants and the `setup()` configuration struct.
// Mirrors sokol_fetch's `SFETCH_MAX_*` defines and `sfetch_desc_t`.

/// Maximum length of a request path, including the NUL terminator.
pub const MAX_PATH: usize = 1024;

/// Maximum number of `u64` words of per-request user data (default 16 -> 128 bytes).
pub const MAX_USERDATA_UINT64: usize = 16;

/// Maximum per-request user-data payload in bytes, 8-byte aligned.
pub const MAX_USERDATA_BYTES: usize = MAX_USERDATA_UINT64 * 8;

/// Hard upper bound on the number of channels a single engine may configure.
pub const MAX_CHANNELS: usize = 16;

/// Hard upper bound on `max_requests` (slot index must fit in 16 bits, with
/// slot 0 reserved as the sentinel).
pub const MAX_REQUESTS: u32 = 65534;

/// Engine configuration passed to `Engine::setup`.
///
/// All fields are clamped to sane bounds by [`Config::clamp`]; `setup` never
/// fails because of an out-of-range value here - it silently clamps, matching
/// `sokol_fetch.h`'s `_sfetch_desc_defaults`.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Pool capacity shared by all channels. Default 128, clamped to
    /// `MAX_REQUESTS`.
    pub max_requests: u32,
    /// Number of independent channels. Default 1, clamped to `MAX_CHANNELS`.
    pub num_channels: u32,
    /// Per-channel concurrency cap. Default 1.
    pub num_lanes: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_requests: 128,
            num_channels: 1,
            num_lanes: 1,
        }
    }
}

impl Config {
    /// Clamp all fields to their documented bounds.
    pub(crate) fn clamp(mut self) -> Self {
        if self.max_requests == 0 {
            self.max_requests = 128;
        }
        if self.max_requests > MAX_REQUESTS {
            self.max_requests = MAX_REQUESTS;
        }
        if self.num_channels == 0 {
            self.num_channels = 1;
        }
        if self.num_channels as usize > MAX_CHANNELS {
            self.num_channels = MAX_CHANNELS as u32;
        }
        if self.num_lanes == 0 {
            self.num_lanes = 1;
        }
        self
    }
}
