//! RESP2 protocol
//!
//! Only the client side of RESP2 is needed here: commands are encoded as
//! arrays of bulk strings and replies are decoded incrementally.

mod codec;
mod reply;

pub use codec::{
    decode_reply, encode_command, encode_reply, MAX_ARRAY_LEN, MAX_BULK_LEN,
    MAX_DEPTH,
};
pub use reply::Reply;
