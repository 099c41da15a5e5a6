//! Small demo of [`DynamicArray`] on top of a [`TrackingResource`].
//!
//! The last read is past the end on purpose: the program reports the
//! error and exits with status 1.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trackalloc::{DynamicArray, TrackingResource};

struct Foo {
    x: i32,
    s: String,
}

fn run(resource: &TrackingResource) -> Result<()> {
    let mut foos = DynamicArray::new_in(resource);

    foos.push(Foo { x: 1, s: "Hello, ".into() })?;
    foos.push(Foo { x: 2, s: "world!".into() })?;

    for foo in &foos {
        println!("{} {}", foo.x, foo.s);
    }

    let mut arr = DynamicArray::new_in(resource);

    for i in 1..=25 {
        arr.push(i)?;
    }

    let elements: Vec<String> = arr.iter().map(i32::to_string).collect();
    println!("Elements: {}", elements.join(" "));

    info!(live_blocks = resource.live_blocks(), live_bytes = resource.live_bytes(), "arrays filled");

    println!("arr[10] = {}", arr.get(10)?);
    println!("arr[100] = {}", arr.get(100)?);

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let resource = TrackingResource::new();
    let outcome = run(&resource);

    info!(stats = ?resource.stats(), "demo finished");
    outcome
}
