//! Advertising pixels and server-side conversions.
//!
//! Every funnel step is mirrored to the Meta and Reddit browser pixels
//! ([`pixels`]) and, for some steps, to the Reddit Conversions API
//! ([`conversions`]). The three are independent and fire-and-forget: none of
//! them can fail or slow down the page that triggered them.

pub mod conversions;
pub mod pixels;

pub use conversions::{
    ConversionError, ConversionEvent, ConversionSink, RedditConversions, UserData,
    fire_and_forget, hash_email, hash_phone, send_logged,
};
pub use pixels::{PixelEvent, PixelSettings, script_json};
