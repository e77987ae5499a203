//! Result directory and file naming
//!
//! Names are derived deterministically from the target identifier and the
//! command text. Two distinct inputs that normalize identically collide;
//! that is a known limitation of the scheme.

/// Directory name for a target: every `.` becomes `_`
#[must_use]
pub fn result_dir_name(target: &str) -> String {
    target.replace('.', "_")
}

/// File name for a command: spaces become `_`, slashes `-`, dots are removed
#[must_use]
pub fn result_file_name(command: &str) -> String {
    command.replace(' ', "_").replace('/', "-").replace('.', "")
}
