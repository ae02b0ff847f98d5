use crate::error::Error;

/// Configuration for a deaggregation port.
#[derive(Debug, Clone)]
pub struct Config {
    /// MAPv4 checksum offload: every data frame carries an 8-byte trailer.
    /// Mutually exclusive with `csum_v5`.
    pub csum_trailer: bool,
    /// MAPv5 checksum offload: data frames may carry a 4-byte checksum
    /// sub-header. Mutually exclusive with `csum_trailer`.
    pub csum_v5: bool,
    /// MAPv5 receive coalescing: data frames may carry a 32-byte coalescing
    /// sub-header describing a superframe.
    pub coalescing: bool,
    /// Decode control command frames (cd_bit) and hand them to the
    /// dispatcher. When disabled, command frames are silently dropped.
    pub commands: bool,
    /// Descriptors to allocate up front for the free list.
    pub pool_prefill: usize,
    /// Hard cap on total descriptors. Past the cap, acquisition fails and
    /// the frame is dropped. 0 = unbounded.
    pub pool_cap: usize,
    /// Fragment slots per materialized packet before continuation buffers
    /// are chained.
    pub max_frags_per_buf: usize,
    /// Headroom reserved in front of each materialized linear buffer.
    pub headroom: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            csum_trailer: false,
            csum_v5: true,
            coalescing: true,
            commands: true,
            pool_prefill: 64,
            pool_cap: 0,
            max_frags_per_buf: 17,
            headroom: 256,
        }
    }
}

impl Config {
    /// Validate configuration values. Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<(), Error> {
        if self.csum_trailer && self.csum_v5 {
            return Err(Error::Config(
                "csum_trailer and csum_v5 are mutually exclusive",
            ));
        }
        if self.max_frags_per_buf == 0 {
            return Err(Error::Config("max_frags_per_buf must be > 0"));
        }
        if self.pool_cap != 0 && self.pool_cap < self.pool_prefill {
            return Err(Error::Config("pool_cap must be >= pool_prefill"));
        }
        Ok(())
    }
}

/// Fluent builder over [`Config`].
///
/// ```
/// use deagg::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .csum_v5(true)
///     .coalescing(true)
///     .pool(128, 4096)
///     .build()
///     .expect("invalid config");
/// assert_eq!(config.pool_prefill, 128);
/// ```
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default config values.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Data format ──────────────────────────────────────────────────

    /// Enable the MAPv4 trailing checksum trailer.
    pub fn csum_trailer(mut self, enable: bool) -> Self {
        self.config.csum_trailer = enable;
        self
    }

    /// Enable MAPv5 checksum-offload sub-headers.
    pub fn csum_v5(mut self, enable: bool) -> Self {
        self.config.csum_v5 = enable;
        self
    }

    /// Enable MAPv5 receive coalescing.
    pub fn coalescing(mut self, enable: bool) -> Self {
        self.config.coalescing = enable;
        self
    }

    /// Enable control command decoding.
    pub fn commands(mut self, enable: bool) -> Self {
        self.config.commands = enable;
        self
    }

    // ── Resources ────────────────────────────────────────────────────

    /// Set the descriptor pool prefill and cap (0 = unbounded).
    pub fn pool(mut self, prefill: usize, cap: usize) -> Self {
        self.config.pool_prefill = prefill;
        self.config.pool_cap = cap;
        self
    }

    /// Set the fragment slots per materialized packet.
    pub fn max_frags_per_buf(mut self, n: usize) -> Self {
        self.config.max_frags_per_buf = n;
        self
    }

    /// Set the headroom reserved in materialized linear buffers.
    pub fn headroom(mut self, n: usize) -> Self {
        self.config.headroom = n;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<Config, Error> {
        self.config.validate()?;
        Ok(self.config)
    }
}
