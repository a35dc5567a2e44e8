// Networking: radio join, AP address service, broker client and session

pub mod dhcp;
pub mod mqtt;
pub mod session;
pub mod wifi;
