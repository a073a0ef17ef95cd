//! Three threads passing the CPU around a ring: cubes hand off to squares,
//! squares to main, main back to cubes.

use std::cell::Cell;

use mykernel::{
    create_thread, exit_thread, get_thread, init_threads_with, yield_thread, KernelConfig,
    SchedPolicy,
};

thread_local! {
    static SQUARE: Cell<i32> = const { Cell::new(0) };
    static CUBE: Cell<i32> = const { Cell::new(0) };
}

fn print_squares(next: i32) {
    for i in 0..5 {
        SQUARE.with(|s| s.set(i * i));
        println!("T{}: {} squared = {}", get_thread(), i, i * i);
        let from = yield_thread(next);
        println!("T{}: resumed by T{}", get_thread(), from);
    }
}

fn print_cubes(next: i32) {
    for i in 0..5 {
        CUBE.with(|c| c.set(i * i * i));
        println!("T{}: {} cubed = {}", get_thread(), i, i * i * i);
        let from = yield_thread(next);
        println!("T{}: resumed by T{}", get_thread(), from);
    }
}

fn main() {
    let policy = match std::env::args().nth(1).as_deref() {
        Some("fifo") => SchedPolicy::Fifo,
        _ => SchedPolicy::RoundRobin,
    };
    println!("\n=== square_cube ({policy:?}) ===\n");

    let result = init_threads_with(KernelConfig::new().with_policy(policy), || {
        let me = get_thread();
        let squares = create_thread(print_squares, me);
        let cubes = create_thread(print_cubes, squares);
        for _ in 0..5 {
            let from = yield_thread(cubes);
            println!(
                "T{}: resumed by T{}, square = {}, cube = {}",
                me,
                from,
                SQUARE.with(Cell::get),
                CUBE.with(Cell::get)
            );
        }
        exit_thread();
    });

    match result {
        Ok(stats) => {
            println!("\nAll threads exited.");
            println!("  context switches: {}", stats.context_switches);
            println!("  threads created:  {}", stats.threads_created);
        }
        Err(err) => {
            eprintln!("kernel failed to start: {err}");
            std::process::exit(1);
        }
    }
}
