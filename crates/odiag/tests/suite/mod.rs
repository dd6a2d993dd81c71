mod properties;
mod scenarios;
mod sync_explorer;
