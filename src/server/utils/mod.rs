pub mod cors_utils;
pub mod encoding_utils;
pub mod playlist_utils;
pub mod target_codec;
pub mod url_resolver;
