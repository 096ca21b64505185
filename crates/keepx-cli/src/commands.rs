//! Subcommands and their output.

use crate::config::Config;
use anyhow::{bail, Context, Result};
use clap::Subcommand;
use keepx_core::models::PASSWORD_FIELD;
use keepx_core::{Database, Disposition, NodeId};
use std::io::Write;

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List subgroups and entries of a group
    Ls {
        /// Group path (defaults to the current group)
        path: Option<String>,
    },
    /// Print the whole group tree
    Tree,
    /// Show an entry's fields
    Show { path: String },
    /// Print the current group's path
    Pwd,
    /// Create a group
    Mkdir {
        /// Parent group path
        path: String,
        name: String,
    },
    /// Delete an entry or group (to the recycle bin unless --permanent)
    Rm {
        #[arg(long)]
        permanent: bool,
        /// PATH names a group instead of an entry
        #[arg(short, long)]
        group: bool,
        path: String,
    },
    /// Move an entry or group into another group
    Mv {
        #[arg(short, long)]
        group: bool,
        src: String,
        dst: String,
    },
    /// Substring search; wrap a pattern in // for a regex
    Search { query: String },
    /// Fuzzy search by title, user name and path
    Find { query: String },
}

impl Command {
    /// True when the command changes the database.
    pub fn mutates(&self) -> bool {
        matches!(self, Command::Mkdir { .. } | Command::Rm { .. } | Command::Mv { .. })
    }
}

/// Run `command` against `db`, writing human-readable output to `out`.
pub fn run(db: &mut Database, command: &Command, config: &Config, out: &mut dyn Write) -> Result<()> {
    match command {
        Command::Ls { path } => {
            let group = match path {
                Some(p) => group_at(db, p)?,
                None => db.current_group()?,
            };
            list(db, group, out)
        }
        Command::Tree => {
            let root = db.root_group().context("Database is not open")?.id;
            print_tree(db, root, 0, out)
        }
        Command::Show { path } => {
            let id = entry_at(db, path)?;
            show(db, id, out)
        }
        Command::Pwd => {
            writeln!(out, "{}", db.current_path())?;
            Ok(())
        }
        Command::Mkdir { path, name } => {
            let parent = group_at(db, path)?;
            let id = db.add_group(parent, name)?;
            writeln!(out, "Created group {name} ({id})")?;
            Ok(())
        }
        Command::Rm {
            permanent,
            group,
            path,
        } => {
            let permanent = *permanent || config.permanent_delete;
            let disposition = if *group {
                let id = group_at(db, path)?;
                db.delete_group(id, permanent)?
            } else {
                let id = entry_at(db, path)?;
                db.delete_entry(id, permanent)?
            };
            match disposition {
                Disposition::Permanent => writeln!(out, "Deleted {path}")?,
                Disposition::Recycle => writeln!(out, "Moved {path} to the recycle bin")?,
            }
            Ok(())
        }
        Command::Mv { group, src, dst } => {
            let target = group_at(db, dst)?;
            let moved = if *group {
                let id = group_at(db, src)?;
                db.move_group(id, target)?
            } else {
                let id = entry_at(db, src)?;
                db.move_entry(id, target)?
            };
            if moved {
                writeln!(out, "Moved {src} to {dst}")?;
            } else {
                writeln!(out, "Not moved: {src} cannot go into {dst}")?;
            }
            Ok(())
        }
        Command::Search { query } => {
            for id in db.search_entries(query, None) {
                writeln!(out, "{}", entry_path(db, id))?;
            }
            Ok(())
        }
        Command::Find { query } => {
            for hit in db.fuzzy_search(query, config.search_limit) {
                let title = db.entry(hit.entry).map(|e| e.title()).unwrap_or_default();
                writeln!(out, "{:>5}  {}{}", hit.score, hit.path, title)?;
            }
            Ok(())
        }
    }
}

fn group_at(db: &Database, path: &str) -> Result<NodeId> {
    match db.find_group_by_path(path) {
        Some(id) => Ok(id),
        None => bail!("No such group: {path}"),
    }
}

fn entry_at(db: &Database, path: &str) -> Result<NodeId> {
    match db.find_entry_by_path(path) {
        Some(id) => Ok(id),
        None => bail!("No such entry: {path}"),
    }
}

fn entry_path(db: &Database, id: NodeId) -> String {
    let Some(entry) = db.entry(id) else {
        return String::new();
    };
    let group = entry
        .parent
        .and_then(|p| db.tree().and_then(|t| keepx_core::path::display_path(t, p)))
        .unwrap_or_default();
    format!("{group}{}", entry.title())
}

fn list(db: &Database, group: NodeId, out: &mut dyn Write) -> Result<()> {
    let g = db.group(group).context("Group vanished")?;
    for child in g.groups.iter().filter_map(|id| db.group(*id)) {
        writeln!(out, "{}/", child.name)?;
    }
    for entry in g.entries.iter().filter_map(|id| db.entry(*id)) {
        writeln!(out, "{}", entry.title())?;
    }
    Ok(())
}

fn print_tree(db: &Database, group: NodeId, depth: usize, out: &mut dyn Write) -> Result<()> {
    let Some(g) = db.group(group) else {
        return Ok(());
    };
    let indent = "  ".repeat(depth);
    writeln!(out, "{indent}{}/", g.name)?;
    for child in &g.groups {
        print_tree(db, *child, depth + 1, out)?;
    }
    for entry in g.entries.iter().filter_map(|id| db.entry(*id)) {
        writeln!(out, "{indent}  {}", entry.title())?;
    }
    Ok(())
}

fn show(db: &Database, id: NodeId, out: &mut dyn Write) -> Result<()> {
    let entry = db.entry(id).context("Entry vanished")?;
    writeln!(out, "Id: {}", entry.id)?;
    for (name, field) in &entry.fields {
        if field.protected || name == PASSWORD_FIELD {
            writeln!(out, "{name}: ********")?;
        } else {
            writeln!(out, "{name}: {}", field.value)?;
        }
    }
    for name in entry.binaries.keys() {
        writeln!(out, "Attachment: {name}")?;
    }
    writeln!(
        out,
        "Modified: {}",
        entry.times.last_modification.format("%Y-%m-%d %H:%M:%S")
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepx_core::CompositeKey;

    fn sample() -> Database {
        let mut db = Database::create("utdb", CompositeKey::from_password("12345"));
        let root = db.root_group().unwrap().id;
        let general = db.add_group(root, "General").unwrap();
        let g1 = db.add_group(general, "G1").unwrap();
        let e = db.add_entry(g1, "mail").unwrap();
        db.update_entry(e, |e| {
            e.set("UserName", "alice");
            e.set("Password", "hunter2");
        })
        .unwrap();
        db
    }

    fn exec(db: &mut Database, command: Command) -> Result<String> {
        let mut out = Vec::new();
        run(db, &command, &Config::default(), &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn ls_and_tree() {
        let mut db = sample();
        assert_eq!(exec(&mut db, Command::Ls { path: None }).unwrap(), "General/\n");
        assert_eq!(
            exec(&mut db, Command::Ls { path: Some("General/G1".into()) }).unwrap(),
            "mail\n"
        );
        assert_eq!(
            exec(&mut db, Command::Tree).unwrap(),
            "utdb/\n  General/\n    G1/\n      mail\n"
        );
        assert!(exec(&mut db, Command::Ls { path: Some("Nope".into()) }).is_err());
    }

    #[test]
    fn show_masks_the_password() {
        let mut db = sample();
        let text = exec(&mut db, Command::Show { path: "General/G1/mail".into() }).unwrap();
        assert!(text.contains("UserName: alice"));
        assert!(text.contains("Password: ********"));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn rm_then_search() {
        let mut db = sample();
        let rm = Command::Rm {
            permanent: false,
            group: false,
            path: "General/G1/mail".into(),
        };
        assert!(rm.mutates());
        assert_eq!(
            exec(&mut db, rm).unwrap(),
            "Moved General/G1/mail to the recycle bin\n"
        );
        assert_eq!(exec(&mut db, Command::Search { query: "alice".into() }).unwrap(), "");
    }

    #[test]
    fn mv_refuses_cycles() {
        let mut db = sample();
        let mv = Command::Mv {
            group: true,
            src: "General".into(),
            dst: "General/G1".into(),
        };
        assert!(exec(&mut db, mv).unwrap().starts_with("Not moved"));
        assert!(db.find_group_by_path("/utdb/General/G1").is_some());
        assert!(db.find_group_by_path("General/G1/General").is_none());
    }
}
