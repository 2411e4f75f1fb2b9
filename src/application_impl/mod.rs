mod jwt_token_codec;
mod path_policy;
mod token_id;
mod token_service_impl;

pub use jwt_token_codec::*;
pub use path_policy::*;
pub use token_id::*;
pub use token_service_impl::*;
