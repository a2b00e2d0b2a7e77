pub mod channels;
pub mod invites;
pub mod roles;
pub mod servers;
pub mod uploads;
