mod handler;

pub use handler::{NOTICE_LIMIT, create_notice, list_notices};
