pub mod compiler;
pub mod executor;
pub mod graph;
pub mod stage;
