use keepx_core::{CompositeKey, Database, KdbxFile, TracingStatusLogger};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "utdb.kdbx".to_string());
    let mut db = Database::create("utdb", CompositeKey::from_password("12345"));
    let root = db.root_group().ok_or("database not open")?.id;

    let general = db.add_group(root, "General")?;
    let g1 = db.add_group(general, "G1")?;
    let g21 = db.add_group(g1, "G21")?;
    let entry = db.add_entry(g21, "G21E1")?;
    db.update_entry(entry, |e| {
        e.set("UserName", "user");
        e.set("Password", "pass");
        e.set("URL", "http://example.com");
    })?;

    let mut parent = db.add_group(root, "Windows")?;
    for name in ["W1", "W2", "W3", "W4", "W5"] {
        parent = db.add_group(parent, name)?;
    }

    // Materialize the recycle bin with something in it
    let old = db.add_entry(root, "Old Entry")?;
    db.delete_entry(old, false)?;

    db.set_storage(Box::new(KdbxFile::new(&path)));
    db.save(&mut TracingStatusLogger::new())?;

    println!("Created {} with password '12345'", path);
    Ok(())
}
