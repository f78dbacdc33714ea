use std::cmp::Ordering;
use std::collections::HashMap;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;
use wsync_core::model::{RemoteCommit, RemoteProject};

/// Folds sub-projects into their parents. A project named `<parent><suffix>`
/// disappears from the listing when `<parent>` exists; the parent's
/// `last_commit` becomes the newest commit of the family. Sub-projects
/// without a listed parent stay as ordinary projects.
pub(crate) fn fold_subprojects(
    projects: Vec<RemoteProject>,
    suffixes: &[String],
) -> Vec<RemoteProject> {
    if suffixes.is_empty() {
        return projects;
    }
    let index: HashMap<String, usize> = projects
        .iter()
        .enumerate()
        .map(|(position, project)| (project.name.to_lowercase(), position))
        .collect();

    let mut parent_of: HashMap<usize, (usize, String)> = HashMap::new();
    for (position, project) in projects.iter().enumerate() {
        let lower = project.name.to_lowercase();
        for suffix in suffixes {
            let Some(parent) = lower.strip_suffix(&suffix.to_lowercase()) else {
                continue;
            };
            if parent.is_empty() {
                continue;
            }
            if let Some(&parent_position) = index.get(parent)
                && parent_position != position
            {
                parent_of.insert(position, (parent_position, suffix.clone()));
                break;
            }
        }
    }

    let mut folded: HashMap<usize, RemoteCommit> = HashMap::new();
    for (&child, (parent, suffix)) in &parent_of {
        let Some(commit) = projects[child].last_commit.as_ref() else {
            continue;
        };
        let current = folded
            .get(parent)
            .or(projects[*parent].last_commit.as_ref());
        if current.is_none_or(|current| is_newer(commit, current)) {
            debug!(
                parent = %projects[*parent].name,
                subproject = %projects[child].name,
                "sub-project carries the newest commit"
            );
            let mut commit = commit.clone();
            commit.from_subproject = Some(suffix.clone());
            folded.insert(*parent, commit);
        }
    }

    projects
        .into_iter()
        .enumerate()
        .filter(|(position, _)| !parent_of.contains_key(position))
        .map(|(position, mut project)| {
            if let Some(commit) = folded.remove(&position) {
                project.last_commit = Some(commit);
            }
            project
        })
        .collect()
}

fn is_newer(candidate: &RemoteCommit, current: &RemoteCommit) -> bool {
    compare_created_at(&candidate.created_at, &current.created_at) == Ordering::Greater
}

fn compare_created_at(left: &str, right: &str) -> Ordering {
    match (
        OffsetDateTime::parse(left, &Rfc3339),
        OffsetDateTime::parse(right, &Rfc3339),
    ) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Ok(_)) => Ordering::Less,
        (Err(_), Err(_)) => left.cmp(right),
    }
}
