#[cfg(test)]
mod test_commit_flow;
#[cfg(test)]
mod test_recovery;
#[cfg(test)]
mod test_verification;
#[cfg(test)]
mod utils;
