mod builders;
mod constants;
mod parsers;
mod types;

pub use builders::Request;
pub use constants::*;
pub use parsers::{Response, get_message_type, parse_response};
pub use types::{MacAddr, SpecProbMatrix, StationId, UpdateStatus, fixed_to_probability, probability_to_fixed, response_len, response_type_for};
