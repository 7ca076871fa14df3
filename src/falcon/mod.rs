//! Falcon cloud API: authentication, region resolution and the endpoints used to push the HOSTS
//! file through Real-Time Response batch sessions.
pub mod api;
pub mod auth;
pub mod client;
pub mod cloud;
pub mod response;
