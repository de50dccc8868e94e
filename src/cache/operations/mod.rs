pub mod cooldown;
pub mod oauth_state;
pub mod token;
