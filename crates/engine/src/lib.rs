pub mod feed;
pub mod history;
pub mod lifecycle;
pub mod session;

pub use feed::{parse_tick, PriceStream};
pub use history::PriceHistory;
pub use lifecycle::{Engine, EngineHandle};
pub use session::{Changes, Session, SessionSnapshot};
