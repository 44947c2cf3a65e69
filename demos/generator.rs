//! Example: a generator coroutine drained with repeated calls.

use fibra::Machine;

fn main() {
    let machine = Machine::new();

    let fibonacci = machine
        .coroutine()
        .name("fibonacci")
        .autostart(false)
        .spawn(|co| {
            let (mut a, mut b) = (0u64, 1u64);
            for _ in 0..10 {
                co.yield_value(a);
                (a, b) = (b, a + b);
            }
        });

    machine.coroutine().name("consumer").spawn(move |co| {
        for _ in 0..10 {
            let value: u64 = co.call(&fibonacci);
            println!("{value}");
        }
    });

    machine.run().unwrap();
}
