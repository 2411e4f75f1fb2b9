mod redis_session_store;

pub use redis_session_store::*;
