mod bar;
mod order;
mod order_status;
mod order_type;
mod position;
mod side;
mod tick;
mod time_in_force;

pub use bar::Bar;
pub use order::{OrderId, OrderSnapshot, OrderSpec, RequestId};
pub use order_status::OrderStatus;
pub use order_type::OrderType;
pub use position::{Position, PositionSnapshot};
pub use side::Side;
pub use tick::TickKind;
pub use time_in_force::TimeInForce;
