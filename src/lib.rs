pub mod picsort_core;
