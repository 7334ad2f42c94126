//! Configuration system for the front-end model.
//!
//! This module defines all configuration structures and enums used to
//! parameterize the fetch stage and the bundled system models. It provides:
//! 1. **Defaults:** Baseline hardware constants (widths, buffer and queue
//!    sizes, prefetch caps, delays).
//! 2. **Structures:** Hierarchical config for the stage, SMT arbitration,
//!    signal delays, and the demo memory system.
//! 3. **Validation:** Construction-time checks that replace runtime aborts.
//!
//! Configuration is supplied as JSON (`serde_json`) or via `Config::default()`.

use serde::Deserialize;

use crate::common::{ConfigError, MAX_THREADS, MAX_WIDTH};

/// Default configuration constants for the model.
///
/// These values define the baseline hardware configuration when not
/// explicitly overridden in a JSON configuration file.
mod defaults {
    /// Instructions fetched per cycle per thread.
    pub const FETCH_WIDTH: usize = 4;

    /// Instructions handed to decode per cycle across all threads.
    pub const DECODE_WIDTH: usize = 4;

    /// Fetch buffer size in bytes.
    ///
    /// Must be a power of two no larger than the cache block; the demand
    /// fetch path reads one buffer's worth of bytes per cache access.
    pub const FETCH_BUFFER_SIZE: usize = 16;

    /// Capacity of each per-thread fetch queue in instructions.
    pub const FETCH_QUEUE_SIZE: usize = 32;

    /// Cache block size in bytes.
    pub const CACHE_BLK_SIZE: usize = 64;

    /// Number of hardware threads.
    pub const NUM_THREADS: usize = 1;

    /// Threads allowed to fetch in one cycle.
    pub const NUM_FETCHING_THREADS: usize = 1;

    /// Run the front end decoupled through the fetch-target queue.
    pub const DECOUPLED_FRONT_END: bool = true;

    /// Maximum instruction-cache prefetches in flight.
    pub const MAX_OUTSTANDING_PREFETCHES: u64 = 4;

    /// Maximum instruction translations in flight.
    pub const MAX_OUTSTANDING_TRANSLATIONS: u64 = 4;

    /// Seed for the drain-arbitration random generator.
    pub const RNG_SEED: u64 = 0x5EED;

    /// Backward signal delay from decode to fetch, in cycles.
    pub const DECODE_TO_FETCH_DELAY: usize = 1;

    /// Backward signal delay from rename to fetch, in cycles.
    pub const RENAME_TO_FETCH_DELAY: usize = 1;

    /// Backward signal delay from IEW to fetch, in cycles.
    pub const IEW_TO_FETCH_DELAY: usize = 1;

    /// Backward signal delay from commit to fetch, in cycles.
    pub const COMMIT_TO_FETCH_DELAY: usize = 1;

    /// Base physical address of the demo system memory.
    pub const MEM_BASE: u64 = 0;

    /// Size of the demo system memory in bytes (16 MiB).
    pub const MEM_SIZE: u64 = 16 * 1024 * 1024;

    /// Demo instruction-cache access latency in cycles.
    pub const ICACHE_LATENCY: u64 = 2;

    /// Demo instruction-cache MSHR count.
    pub const ICACHE_MSHRS: usize = 4;

    /// Demo instruction-TLB translation latency in cycles.
    pub const TRANSLATION_LATENCY: u64 = 1;
}

/// SMT fetch arbitration policies.
///
/// Selects which eligible hardware thread fetches in a given cycle when
/// more than one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SmtFetchPolicy {
    /// Rotate priority among eligible threads.
    #[default]
    RoundRobin,
    /// Prefer the thread with the fewest issue-queue entries.
    #[serde(alias = "IQCount")]
    IqCount,
    /// Prefer the thread with the fewest load/store-queue entries.
    #[serde(alias = "LSQCount")]
    LsqCount,
    /// Branch-count policy. Not implemented; selecting it is fatal.
    Branch,
}

/// Root configuration structure containing all model settings.
///
/// # Examples
///
/// ```
/// use fdip_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.fetch.fetch_width, 4);
/// assert!(config.validate().is_ok());
/// ```
///
/// Deserializing from JSON:
///
/// ```
/// use fdip_core::config::{Config, SmtFetchPolicy};
///
/// let json = r#"{
///     "fetch": { "fetch_width": 8, "fetch_buffer_size": 32 },
///     "smt": { "num_threads": 2, "fetch_policy": "RoundRobin" }
/// }"#;
///
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.fetch.fetch_width, 8);
/// assert_eq!(config.smt.num_threads, 2);
/// assert_eq!(config.smt.fetch_policy, SmtFetchPolicy::RoundRobin);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Fetch stage parameters.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// SMT arbitration parameters.
    #[serde(default)]
    pub smt: SmtConfig,
    /// Backward signal delays.
    #[serde(default)]
    pub delays: DelayConfig,
    /// Demo memory-system parameters.
    #[serde(default)]
    pub system: SystemConfig,
}

impl Config {
    /// Checks the construction-time invariants of the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let f = &self.fetch;
        let s = &self.smt;

        if s.num_threads == 0 || s.num_threads > MAX_THREADS {
            return Err(ConfigError::TooManyThreads {
                requested: s.num_threads,
                limit: MAX_THREADS,
            });
        }
        if s.num_fetching_threads == 0 || s.num_fetching_threads > s.num_threads {
            return Err(ConfigError::TooManyFetchingThreads {
                requested: s.num_fetching_threads,
                threads: s.num_threads,
            });
        }
        if f.fetch_width == 0 || f.fetch_width > MAX_WIDTH {
            return Err(ConfigError::WidthTooLarge {
                requested: f.fetch_width,
                limit: MAX_WIDTH,
            });
        }
        if f.decode_width == 0 || f.decode_width > MAX_WIDTH {
            return Err(ConfigError::WidthTooLarge {
                requested: f.decode_width,
                limit: MAX_WIDTH,
            });
        }
        if !f.fetch_buffer_size.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                name: "fetch_buffer_size",
                value: f.fetch_buffer_size,
            });
        }
        if !f.cache_blk_size.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                name: "cache_blk_size",
                value: f.cache_blk_size,
            });
        }
        if f.fetch_buffer_size > f.cache_blk_size {
            return Err(ConfigError::BufferLargerThanBlock {
                buffer: f.fetch_buffer_size,
                block: f.cache_blk_size,
            });
        }
        if f.cache_blk_size % f.fetch_buffer_size != 0 {
            return Err(ConfigError::BlockNotMultipleOfBuffer {
                buffer: f.fetch_buffer_size,
                block: f.cache_blk_size,
            });
        }
        Ok(())
    }
}

/// Fetch stage parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Instructions fetched per cycle per thread.
    #[serde(default = "FetchConfig::default_fetch_width")]
    pub fetch_width: usize,

    /// Instructions handed to decode per cycle across all threads.
    #[serde(default = "FetchConfig::default_decode_width")]
    pub decode_width: usize,

    /// Fetch buffer size in bytes (power of two, divides the cache block).
    #[serde(default = "FetchConfig::default_fetch_buffer_size")]
    pub fetch_buffer_size: usize,

    /// Capacity of each per-thread fetch queue in instructions.
    #[serde(default = "FetchConfig::default_fetch_queue_size")]
    pub fetch_queue_size: usize,

    /// Cache block size in bytes.
    #[serde(default = "FetchConfig::default_cache_blk_size")]
    pub cache_blk_size: usize,

    /// Run the front end decoupled through the fetch-target queue.
    #[serde(default = "FetchConfig::default_decoupled")]
    pub decoupled_front_end: bool,

    /// Maximum instruction-cache prefetches in flight.
    #[serde(default = "FetchConfig::default_max_prefetches")]
    pub max_outstanding_prefetches: u64,

    /// Maximum instruction translations in flight.
    #[serde(default = "FetchConfig::default_max_translations")]
    pub max_outstanding_translations: u64,

    /// Seed for the drain-arbitration random generator.
    #[serde(default = "FetchConfig::default_rng_seed")]
    pub rng_seed: u64,
}

impl FetchConfig {
    fn default_fetch_width() -> usize {
        defaults::FETCH_WIDTH
    }
    fn default_decode_width() -> usize {
        defaults::DECODE_WIDTH
    }
    fn default_fetch_buffer_size() -> usize {
        defaults::FETCH_BUFFER_SIZE
    }
    fn default_fetch_queue_size() -> usize {
        defaults::FETCH_QUEUE_SIZE
    }
    fn default_cache_blk_size() -> usize {
        defaults::CACHE_BLK_SIZE
    }
    fn default_decoupled() -> bool {
        defaults::DECOUPLED_FRONT_END
    }
    fn default_max_prefetches() -> u64 {
        defaults::MAX_OUTSTANDING_PREFETCHES
    }
    fn default_max_translations() -> u64 {
        defaults::MAX_OUTSTANDING_TRANSLATIONS
    }
    fn default_rng_seed() -> u64 {
        defaults::RNG_SEED
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            fetch_width: defaults::FETCH_WIDTH,
            decode_width: defaults::DECODE_WIDTH,
            fetch_buffer_size: defaults::FETCH_BUFFER_SIZE,
            fetch_queue_size: defaults::FETCH_QUEUE_SIZE,
            cache_blk_size: defaults::CACHE_BLK_SIZE,
            decoupled_front_end: defaults::DECOUPLED_FRONT_END,
            max_outstanding_prefetches: defaults::MAX_OUTSTANDING_PREFETCHES,
            max_outstanding_translations: defaults::MAX_OUTSTANDING_TRANSLATIONS,
            rng_seed: defaults::RNG_SEED,
        }
    }
}

/// SMT arbitration parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtConfig {
    /// Number of hardware threads.
    #[serde(default = "SmtConfig::default_num_threads")]
    pub num_threads: usize,

    /// Threads allowed to fetch in one cycle.
    #[serde(default = "SmtConfig::default_num_fetching")]
    pub num_fetching_threads: usize,

    /// Arbitration policy.
    #[serde(default)]
    pub fetch_policy: SmtFetchPolicy,
}

impl SmtConfig {
    fn default_num_threads() -> usize {
        defaults::NUM_THREADS
    }
    fn default_num_fetching() -> usize {
        defaults::NUM_FETCHING_THREADS
    }
}

impl Default for SmtConfig {
    fn default() -> Self {
        Self {
            num_threads: defaults::NUM_THREADS,
            num_fetching_threads: defaults::NUM_FETCHING_THREADS,
            fetch_policy: SmtFetchPolicy::default(),
        }
    }
}

/// Backward signal delays toward fetch, in cycles.
#[derive(Debug, Clone, Deserialize)]
pub struct DelayConfig {
    /// Decode to fetch.
    #[serde(default = "DelayConfig::default_delay")]
    pub decode_to_fetch: usize,

    /// Rename to fetch.
    #[serde(default = "DelayConfig::default_delay")]
    pub rename_to_fetch: usize,

    /// IEW to fetch.
    #[serde(default = "DelayConfig::default_delay")]
    pub iew_to_fetch: usize,

    /// Commit to fetch.
    #[serde(default = "DelayConfig::default_delay")]
    pub commit_to_fetch: usize,
}

impl DelayConfig {
    fn default_delay() -> usize {
        defaults::DECODE_TO_FETCH_DELAY
    }

    /// Longest backward delay; sizes the signal time buffer.
    pub fn max_delay(&self) -> usize {
        self.decode_to_fetch
            .max(self.rename_to_fetch)
            .max(self.iew_to_fetch)
            .max(self.commit_to_fetch)
    }
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            decode_to_fetch: defaults::DECODE_TO_FETCH_DELAY,
            rename_to_fetch: defaults::RENAME_TO_FETCH_DELAY,
            iew_to_fetch: defaults::IEW_TO_FETCH_DELAY,
            commit_to_fetch: defaults::COMMIT_TO_FETCH_DELAY,
        }
    }
}

/// Demo memory-system parameters used by the bundled driver.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    /// Base physical address of system memory.
    #[serde(default = "SystemConfig::default_mem_base")]
    pub mem_base: u64,

    /// Size of system memory in bytes.
    #[serde(default = "SystemConfig::default_mem_size")]
    pub mem_size: u64,

    /// Instruction-cache access latency in cycles.
    #[serde(default = "SystemConfig::default_icache_latency")]
    pub icache_latency: u64,

    /// Instruction-cache MSHR count.
    #[serde(default = "SystemConfig::default_icache_mshrs")]
    pub icache_mshrs: usize,

    /// Instruction-TLB translation latency in cycles.
    #[serde(default = "SystemConfig::default_translation_latency")]
    pub translation_latency: u64,
}

impl SystemConfig {
    fn default_mem_base() -> u64 {
        defaults::MEM_BASE
    }
    fn default_mem_size() -> u64 {
        defaults::MEM_SIZE
    }
    fn default_icache_latency() -> u64 {
        defaults::ICACHE_LATENCY
    }
    fn default_icache_mshrs() -> usize {
        defaults::ICACHE_MSHRS
    }
    fn default_translation_latency() -> u64 {
        defaults::TRANSLATION_LATENCY
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            mem_base: defaults::MEM_BASE,
            mem_size: defaults::MEM_SIZE,
            icache_latency: defaults::ICACHE_LATENCY,
            icache_mshrs: defaults::ICACHE_MSHRS,
            translation_latency: defaults::TRANSLATION_LATENCY,
        }
    }
}
