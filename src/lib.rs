pub mod auth;
pub mod captcha;
pub mod config;
pub mod probe;
pub mod server;
pub mod web;
pub mod wol;

#[cfg(test)]
pub(crate) mod test_support;
