mod pipeline;
mod run;
mod store;

#[cfg(test)]
mod tests;

pub use run::run;
