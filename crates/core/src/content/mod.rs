pub mod id;
pub mod kind;
pub mod model;
pub mod validate;

pub use kind::{ContentType, PublishedFilter, UnknownContentType};
pub use model::{parse_date, ContentRecord, ContentStatus, Fields};
