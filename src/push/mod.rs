//! Pushes the HOSTS file through RTR batch sessions.
//!
//! [pusher::HostsPusher] verifies the scope and the put file, collects the Windows hosts and
//! runs the commands that back up the current HOSTS file and put the new one in place.
pub mod error;
pub mod pusher;
pub mod report;
