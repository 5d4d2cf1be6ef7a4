pub mod customer;
pub mod identity;
pub mod offer;
pub mod order;
pub mod product;
pub mod quota_batch;
pub mod referral;
pub mod transaction;
pub mod trial;
pub mod user;

pub use customer::*;
pub use identity::*;
pub use offer::*;
pub use order::*;
pub use product::*;
pub use quota_batch::*;
pub use referral::*;
pub use transaction::*;
pub use trial::*;
pub use user::*;
