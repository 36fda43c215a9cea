//! Minimal end-to-end walkthrough: create a table, insert a few rows,
//! abort one transaction, commit another, then scan what survived.
//!
//! Run with `cargo run --example basic_usage`.

use anyhow::Result;
use heapdb::access::{DataType, Schema, Tuple, Value};
use heapdb::database::Database;
use log::info;

fn main() -> Result<()> {
    env_logger::init();

    let dir = tempfile::tempdir()?;
    let db = Database::open(dir.path())?;

    let schema = Schema::new(vec![DataType::Int32, DataType::Text(32)]);
    db.create_table("users", schema)?;
    info!("created table 'users' in {:?}", dir.path());

    // This transaction commits, so its rows stick.
    let t1 = db.begin();
    db.insert(t1, "users", &Tuple::new(vec![Value::Int(1), Value::Text("alice".into())]))?;
    db.insert(t1, "users", &Tuple::new(vec![Value::Int(2), Value::Text("bob".into())]))?;
    db.commit(t1)?;
    info!("{} committed 2 rows", t1);

    // This one aborts; its row is rolled back from the before-image.
    let t2 = db.begin();
    db.insert(t2, "users", &Tuple::new(vec![Value::Int(3), Value::Text("mallory".into())]))?;
    db.abort(t2)?;
    info!("{} aborted", t2);

    let t3 = db.begin();
    let mut scan = db.scan(t3, "users")?;
    scan.open()?;
    println!("id | name");
    println!("---+------");
    while let Some(tuple) = scan.next_tuple()? {
        if let [Value::Int(id), Value::Text(name)] = tuple.values() {
            println!("{:>2} | {}", id, name);
        }
    }
    db.commit(t3)?;

    Ok(())
}
