use crate::error::{Error, Result};
use crate::schema::REPOSITORY_COLLECTION;

const MAX_REPO_NAME_LEN: usize = 100;

fn is_valid_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'
}

/// Checks that a repository name can double as the name of its commit collection.
pub fn validate_repo_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::BadRequest("Repository name cannot be empty".into()));
    }
    if name.len() > MAX_REPO_NAME_LEN {
        return Err(Error::BadRequest(format!(
            "Repository name cannot exceed {MAX_REPO_NAME_LEN} characters"
        )));
    }
    if !name.chars().all(is_valid_name_char) {
        return Err(Error::BadRequest(
            "Repository name can only contain alphanumeric characters, hyphens, underscores, and periods"
                .into(),
        ));
    }
    if name.starts_with('_') {
        return Err(Error::BadRequest(
            "Repository name cannot start with an underscore".into(),
        ));
    }
    if name == REPOSITORY_COLLECTION {
        return Err(Error::BadRequest(format!(
            "Repository name '{REPOSITORY_COLLECTION}' is reserved"
        )));
    }
    Ok(())
}
