pub mod account;
pub mod order;
pub mod points;

pub use account::{Balance, UserId, Withdrawal};
pub use order::{Order, OrderNumber, OrderNumberError, OrderStatus};
pub use points::{Points, PointsError};
