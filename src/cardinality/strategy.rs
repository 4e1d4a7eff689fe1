/// How the limiter behaves once a metric (or the agent as a whole) is at
/// its series limit and a brand-new series shows up.
#[derive(Debug, Clone, PartialEq)]
pub enum LimitStrategy {
    /// New series are refused outright.
    Drop,
    /// New series are folded into a reduced-cardinality series obtained by
    /// stripping `aggregation_labels` from the label set, so the total
    /// point count is preserved instead of refusing the datapoint.
    Aggregate { aggregation_labels: Vec<String> },
    /// New series are admitted probabilistically, at `rate` (0.0..=1.0).
    Sample { rate: f64 },
    /// The least-recently-seen series is evicted to make room for the new
    /// one. "Recently-seen" is refreshed on every admitted datapoint for an
    /// already-tracked series, i.e. classic LRU, not insertion order.
    OldestEvict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmitDecision {
    /// Series was already tracked, or room was available.
    Admitted,
    /// Series was already tracked and its LRU position was refreshed.
    Refreshed,
    /// A new series replaced the least-recently-seen one.
    EvictedOldest(String),
    /// The datapoint should be folded into the named reduced-cardinality
    /// series; the caller merges its value via
    /// [`super::limiter::CardinalityLimiter::merge`].
    Aggregated(String),
    /// The datapoint passed the sampling threshold and is admitted.
    Sampled,
    /// The datapoint failed the sampling threshold.
    SampledOut,
    /// No room, and the strategy has no admission path left.
    Dropped,
}
