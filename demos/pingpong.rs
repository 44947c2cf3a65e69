//! Example: two coroutines taking turns.

use fibra::Machine;

fn main() {
    let machine = Machine::new();

    for name in ["ping", "pong"] {
        machine.coroutine().name(name).spawn(move |co| {
            for round in 1..=3 {
                println!("{name} {round}");
                co.yield_now();
            }
        });
    }

    machine.run().unwrap();
    println!("done");
}
