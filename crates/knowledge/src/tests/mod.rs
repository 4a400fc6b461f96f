//! Scenario tests across ingestion, retrieval and generation.


mod ask_scenarios;
mod generation;
mod retrieval;
