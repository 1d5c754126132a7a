use clap::Subcommand;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::GalleryError;
use crate::services::db::Database;
use crate::services::layout::{is_plain_segment, StorageLayout};

const GENERATED_PASSWORD_LEN: usize = 12;

/// Account administration against the configured database and storage roots.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum UserOp {
    /// List users with their groups and folder grants
    List,
    /// Create a user together with their own private folder
    Add {
        username: String,
        /// Comma-separated group list
        #[arg(long, default_value = "")]
        groups: String,
        /// Password to set; a random one is generated and printed otherwise
        #[arg(long)]
        password: Option<String>,
    },
    /// Delete a user and their grants. Their folder is left on disk
    Delete { username: String },
    /// Change a password; a random one is generated and printed if omitted
    Passwd {
        username: String,
        password: Option<String>,
    },
    /// Grant a private folder to one user, one group, or every user
    Grant {
        folder: String,
        #[arg(long, conflicts_with = "group")]
        user: Option<String>,
        #[arg(long)]
        group: Option<String>,
    },
    /// Revoke a private folder from one user, one group, or every user
    Revoke {
        folder: String,
        #[arg(long, conflicts_with = "group")]
        user: Option<String>,
        #[arg(long)]
        group: Option<String>,
    },
    /// Replace a user's group list
    SetGroups { username: String, groups: String },
    /// List groups and their members
    Groups,
}

#[derive(Debug, thiserror::Error)]
pub enum UserOpError {
    #[error("user not found: {0}")]
    UnknownUser(String),
    #[error("group not found: {0}")]
    UnknownGroup(String),
    #[error("no private folder named {0:?}")]
    UnknownFolder(String),
    #[error("user already exists: {0}")]
    UserExists(String),
    #[error("invalid username: {0:?}")]
    InvalidUsername(String),
    #[error("failed to create private folder: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] GalleryError),
}

pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Run one operation and return the report to print.
pub fn run_user_op(op: UserOp, db: &Database, layout: &StorageLayout) -> Result<String, UserOpError> {
    match op {
        UserOp::List => {
            let users = db.list_users()?;
            if users.is_empty() {
                return Ok("no users".to_string());
            }
            let lines: Vec<String> = users
                .iter()
                .map(|user| {
                    format!(
                        "{}  groups: {}  folders: {}",
                        user.username,
                        or_none(user.groups.join(",")),
                        or_none(user.folders.iter().cloned().collect::<Vec<_>>().join(", ")),
                    )
                })
                .collect();
            Ok(lines.join("\n"))
        }
        UserOp::Add {
            username,
            groups,
            password,
        } => {
            if !is_plain_segment(&username) {
                return Err(UserOpError::InvalidUsername(username));
            }
            if db.principal(&username)?.is_some() {
                return Err(UserOpError::UserExists(username));
            }
            let password = password.unwrap_or_else(generate_password);
            db.add_user(&username, &password, &groups)?;

            let folder = layout.private_root().join(&username);
            std::fs::create_dir_all(&folder)?;
            db.grant_access(&username, &username)?;
            tracing::info!(user = %username, "user added");

            Ok(format!(
                "created {}\npassword: {}\nfolder {} created and granted",
                username,
                password,
                folder.display()
            ))
        }
        UserOp::Delete { username } => {
            if !db.delete_user(&username)? {
                return Err(UserOpError::UnknownUser(username));
            }
            tracing::info!(user = %username, "user deleted");
            Ok(format!("deleted {} and their grants", username))
        }
        UserOp::Passwd { username, password } => {
            let password = password.unwrap_or_else(generate_password);
            if !db.set_password(&username, &password)? {
                return Err(UserOpError::UnknownUser(username));
            }
            tracing::info!(user = %username, "password changed");
            Ok(format!("password for {} changed to: {}", username, password))
        }
        UserOp::Grant { folder, user, group } => {
            if layout.private_folder(&folder).is_none() {
                return Err(UserOpError::UnknownFolder(folder));
            }
            let targets = targets(db, user, group)?;
            for username in &targets {
                db.grant_access(username, &folder)?;
            }
            tracing::info!(folder = %folder, users = targets.len(), "access granted");
            Ok(format!("granted {} to {}", folder, or_none(targets.join(", "))))
        }
        UserOp::Revoke { folder, user, group } => {
            let targets = targets(db, user, group)?;
            let mut revoked = Vec::new();
            for username in targets {
                if db.revoke_access(&username, &folder)? {
                    revoked.push(username);
                }
            }
            tracing::info!(folder = %folder, users = revoked.len(), "access revoked");
            Ok(format!("revoked {} from {}", folder, or_none(revoked.join(", "))))
        }
        UserOp::SetGroups { username, groups } => {
            if !db.set_groups(&username, &groups)? {
                return Err(UserOpError::UnknownUser(username));
            }
            Ok(format!("groups for {} set to: {}", username, or_none(groups)))
        }
        UserOp::Groups => {
            let groups = db.list_groups()?;
            if groups.is_empty() {
                return Ok("no groups".to_string());
            }
            let lines: Vec<String> = groups
                .iter()
                .map(|(group, members)| format!("{}  {}", group, members.join(", ")))
                .collect();
            Ok(lines.join("\n"))
        }
    }
}

/// Usernames addressed by `--user`/`--group`; neither means every user.
fn targets(db: &Database, user: Option<String>, group: Option<String>) -> Result<Vec<String>, UserOpError> {
    match (user, group) {
        (Some(user), _) => {
            if db.principal(&user)?.is_none() {
                return Err(UserOpError::UnknownUser(user));
            }
            Ok(vec![user])
        }
        (None, Some(group)) => db
            .list_groups()?
            .remove(&group)
            .ok_or(UserOpError::UnknownGroup(group)),
        (None, None) => Ok(db.list_users()?.into_iter().map(|u| u.username).collect()),
    }
}

fn or_none(value: String) -> String {
    if value.is_empty() {
        "none".to_string()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::Path;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(subcommand)]
        op: UserOp,
    }

    fn parse(args: &[&str]) -> Result<UserOp, clap::Error> {
        TestCli::try_parse_from(std::iter::once("user").chain(args.iter().copied())).map(|cli| cli.op)
    }

    fn setup(dir: &Path) -> (Database, StorageLayout) {
        let layout = StorageLayout::new(&dir.join("PUBLIC"), &dir.join("PRIVATE"), "PRIVATE", &[]).unwrap();
        let db = Database::open_in_memory().unwrap().with_hash_rounds(1_000);
        (db, layout)
    }

    fn add(db: &Database, layout: &StorageLayout, username: &str, groups: &str) -> String {
        run_user_op(
            UserOp::Add {
                username: username.to_string(),
                groups: groups.to_string(),
                password: None,
            },
            db,
            layout,
        )
        .unwrap()
    }

    #[test]
    fn parses_subcommands() {
        assert_eq!(
            parse(&["add", "alice", "--groups", "family,friends"]).unwrap(),
            UserOp::Add {
                username: "alice".into(),
                groups: "family,friends".into(),
                password: None,
            }
        );
        assert_eq!(
            parse(&["grant", "Trip", "--group", "family"]).unwrap(),
            UserOp::Grant {
                folder: "Trip".into(),
                user: None,
                group: Some("family".into()),
            }
        );
        assert_eq!(
            parse(&["set-groups", "bob", "see-hidden"]).unwrap(),
            UserOp::SetGroups {
                username: "bob".into(),
                groups: "see-hidden".into(),
            }
        );
        assert!(parse(&["grant", "Trip", "--user", "a", "--group", "g"]).is_err());
    }

    #[test]
    fn add_creates_folder_grant_and_password() {
        let dir = tempfile::tempdir().unwrap();
        let (db, layout) = setup(dir.path());

        let report = add(&db, &layout, "alice", "family");
        let password = report
            .lines()
            .find_map(|line| line.strip_prefix("password: "))
            .unwrap();
        assert_eq!(password.len(), 12);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));

        assert!(layout.private_root().join("alice").is_dir());
        let principal = db.authenticate("alice", password).unwrap().unwrap();
        assert!(principal.has_folder("alice"));
        assert_eq!(principal.capabilities.primary(), Some("family"));
    }

    #[test]
    fn add_rejects_duplicates_and_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        let (db, layout) = setup(dir.path());
        add(&db, &layout, "alice", "");

        let again = UserOp::Add {
            username: "alice".into(),
            groups: String::new(),
            password: Some("x".into()),
        };
        assert!(matches!(run_user_op(again, &db, &layout), Err(UserOpError::UserExists(_))));

        let escape = UserOp::Add {
            username: "../evil".into(),
            groups: String::new(),
            password: Some("x".into()),
        };
        assert!(matches!(run_user_op(escape, &db, &layout), Err(UserOpError::InvalidUsername(_))));
        assert!(!dir.path().join("evil").exists());
    }

    #[test]
    fn grant_and_revoke_by_group() {
        let dir = tempfile::tempdir().unwrap();
        let (db, layout) = setup(dir.path());
        add(&db, &layout, "alice", "family");
        add(&db, &layout, "bob", "family,friends");
        add(&db, &layout, "carol", "friends");
        std::fs::create_dir_all(layout.private_root().join("Trip")).unwrap();

        let grant = UserOp::Grant {
            folder: "Trip".into(),
            user: None,
            group: Some("family".into()),
        };
        run_user_op(grant, &db, &layout).unwrap();
        assert!(db.grants_for("alice").unwrap().contains("Trip"));
        assert!(db.grants_for("bob").unwrap().contains("Trip"));
        assert!(!db.grants_for("carol").unwrap().contains("Trip"));

        let revoke = UserOp::Revoke {
            folder: "Trip".into(),
            user: Some("bob".into()),
            group: None,
        };
        run_user_op(revoke, &db, &layout).unwrap();
        assert!(!db.grants_for("bob").unwrap().contains("Trip"));
        assert!(db.grants_for("alice").unwrap().contains("Trip"));

        let everyone = UserOp::Grant {
            folder: "Trip".into(),
            user: None,
            group: None,
        };
        run_user_op(everyone, &db, &layout).unwrap();
        for user in ["alice", "bob", "carol"] {
            assert!(db.grants_for(user).unwrap().contains("Trip"), "{}", user);
        }
    }

    #[test]
    fn unknown_targets_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (db, layout) = setup(dir.path());
        add(&db, &layout, "alice", "family");

        let missing_folder = UserOp::Grant {
            folder: "Nope".into(),
            user: Some("alice".into()),
            group: None,
        };
        assert!(matches!(
            run_user_op(missing_folder, &db, &layout),
            Err(UserOpError::UnknownFolder(_))
        ));

        let missing_group = UserOp::Grant {
            folder: "alice".into(),
            user: None,
            group: Some("nobody".into()),
        };
        assert!(matches!(
            run_user_op(missing_group, &db, &layout),
            Err(UserOpError::UnknownGroup(_))
        ));

        for op in [
            UserOp::Delete { username: "ghost".into() },
            UserOp::Passwd {
                username: "ghost".into(),
                password: None,
            },
            UserOp::SetGroups {
                username: "ghost".into(),
                groups: "x".into(),
            },
        ] {
            assert!(matches!(run_user_op(op, &db, &layout), Err(UserOpError::UnknownUser(_))));
        }
    }

    #[test]
    fn passwd_set_groups_delete_and_listings() {
        let dir = tempfile::tempdir().unwrap();
        let (db, layout) = setup(dir.path());
        add(&db, &layout, "alice", "family");

        let passwd = UserOp::Passwd {
            username: "alice".into(),
            password: Some("hunter2".into()),
        };
        run_user_op(passwd, &db, &layout).unwrap();
        assert!(db.authenticate("alice", "hunter2").unwrap().is_some());

        let set = UserOp::SetGroups {
            username: "alice".into(),
            groups: "admins, see-hidden".into(),
        };
        run_user_op(set, &db, &layout).unwrap();
        let groups = run_user_op(UserOp::Groups, &db, &layout).unwrap();
        assert!(groups.contains("admins  alice"));
        assert!(!groups.contains("family"));

        let list = run_user_op(UserOp::List, &db, &layout).unwrap();
        assert_eq!(list, "alice  groups: admins,see-hidden  folders: alice");

        run_user_op(UserOp::Delete { username: "alice".into() }, &db, &layout).unwrap();
        assert_eq!(run_user_op(UserOp::List, &db, &layout).unwrap(), "no users");
        assert_eq!(run_user_op(UserOp::Groups, &db, &layout).unwrap(), "no groups");
        assert!(layout.private_root().join("alice").is_dir());
    }
}
