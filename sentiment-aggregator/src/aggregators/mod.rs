pub mod daily;
pub mod roll_forward;

pub use roll_forward::RollForwardBucket;
