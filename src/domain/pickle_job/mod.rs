use slotmap::new_key_type;

pub mod deferred_value;
pub mod execute;
pub mod jar;
pub mod organizer;
pub mod pickle_job;

new_key_type! {
    pub struct JobId;
}
