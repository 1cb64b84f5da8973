pub mod shout_out;
pub mod user;
