pub mod pkce;
pub mod secret;
