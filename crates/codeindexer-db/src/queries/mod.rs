pub mod codebases;
pub mod jobs;
pub mod projects;
