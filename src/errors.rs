use thiserror::Error;

/// Fatal failures while establishing or using a secure channel.
///
/// None of these are retryable in place: transcript state and nonce counters
/// cannot be rewound, so the caller must open a fresh connection and run a new
/// handshake with fresh ephemeral keys.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// AEAD tag verification failed. Treated as a potential active attack;
    /// the keys involved must not be reused.
    #[error("authentication failed: AEAD tag rejected")]
    Authentication,

    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("message exceeds frame limit: {len} > {max}")]
    Oversized { len: usize, max: usize },

    #[error("transport failure: {0}")]
    Network(#[from] std::io::Error),

    #[error("handshake step out of order")]
    OutOfOrder,
}

/// Failures in light-client commit verification.
#[derive(Debug, Error)]
pub enum TrustError {
    /// Validator turnover between two heights exceeds the 1/3 safety bound.
    /// Internal to the verifier: caught and converted into a bisection step,
    /// never surfaced to the end caller.
    #[error("validator change too large: old-set power {accrued} of {total} backing height {height}")]
    TooMuchChange {
        height: u64,
        accrued: i64,
        total: i64,
    },

    #[error("not found: {0}")]
    NotFound(&'static str),

    #[error("invalid commit: {0}")]
    InvalidCommit(&'static str),

    #[error("quorum not reached: accrued power {accrued}, total {total}")]
    QuorumNotReached { accrued: i64, total: i64 },

    #[error("bad signature from validator at index {index}")]
    BadSignature { index: usize },

    #[error("malformed peer response: {0}")]
    Encoding(String),

    #[error("peer request failed: {0}")]
    Network(String),

    #[error("trust store i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("bisection depth exhausted between heights {trusted} and {target}")]
    BisectDepthExceeded { trusted: u64, target: u64 },
}
