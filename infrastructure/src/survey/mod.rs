//! Survey definition files
//!
//! A survey file is TOML holding the questions, their branching rules, the
//! memory plan, and optionally the agents and scenarios to run it with.

mod survey_file;

pub use survey_file::{
    FileAgent, FileMemory, FileRule, FileSkipRule, MemoryMode, SurveyFile, SurveyFileError,
    SurveyParts,
};
