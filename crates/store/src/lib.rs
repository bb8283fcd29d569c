mod quota;
mod seen;

pub use quota::{QuotaCounters, QuotaDecision, QuotaStore};
pub use seen::SeenStore;
