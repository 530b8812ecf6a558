pub mod processes;

pub use processes::ProcessesProvider;
