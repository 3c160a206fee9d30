mod trending_recompute;

pub use trending_recompute::{TrendingRecomputeJob, TRENDING_RECOMPUTE_JOB_ID};
