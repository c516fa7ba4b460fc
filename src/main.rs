//! Tiny demo binary: open a d3plot file and print a model summary.

use d3plot_reader::{D3plotReader, ElementKind};

fn main() {
    let mut args = std::env::args().skip(1);
    let path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!("usage: d3plot-info <d3plot file> [--compressed]");
            std::process::exit(2);
        }
    };
    let compressed = args.any(|arg| arg == "--compressed");

    // An empty request still walks the states, so the timestep table is
    // available for the summary.
    let no_variables: [&str; 0] = [];
    let reader = match D3plotReader::new(&path, &no_variables, compressed) {
        Ok(reader) => reader,
        Err(error) => {
            eprintln!("error: {}", error);
            std::process::exit(1);
        }
    };

    println!("Title : {}", reader.title());
    println!("Nodes : {}", reader.store().n_nodes());
    println!("Beams : {}", reader.store().n_elements(ElementKind::Beam));
    println!("Shells: {}", reader.store().n_elements(ElementKind::Shell));
    println!("Solids: {}", reader.store().n_elements(ElementKind::Solid));
    println!("States: {}", reader.n_states());
    if let (Some(first), Some(last)) = (reader.timesteps().first(), reader.timesteps().last()) {
        println!("Time  : {} .. {}", first, last);
    }
    for part in reader.parts() {
        println!("Part {:>6}: {}", part.id(), part.name());
    }
}
