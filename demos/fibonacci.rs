/*
A Fibonacci generator as a coroutine, runnable on an x86-64 or AArch64 host:

    cargo run --example fibonacci

The first resume's value tells the coroutine how many numbers to yield; the
value after that many resumes is its return value, and the generator is Dead.
*/

use minicoro::*;

fn fib(co: &mut MCYielder<u64>, n: u64) -> u64
{
    let mut a = 0u64;
    let mut b = 1u64;

    for _ in 0..n {
        let mut d = a;
        co.suspend(&mut d).unwrap();

        let t = a + b;
        a = b;
        b = t;
    }

    a
}

fn main()
{
    let mut stack = MCCoro::<u64>::stack::<[u8; 64 * 1024]>();
    let mut gen = MCCoro::<u64>::new();

    gen.init(&mut stack, fib).unwrap();

    let mut data = 10; // ask for ten numbers
    gen.resume(&mut data).unwrap();

    while gen.state() == MCState::Suspended {
        println!("{}", data);

        data = 0;
        gen.resume(&mut data).unwrap();
    }

    println!("done, F(10) = {}", data);
    assert_eq!(gen.state(), MCState::Dead);
}
