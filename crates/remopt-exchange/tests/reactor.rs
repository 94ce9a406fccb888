use std::io::Read;
use std::os::unix::net::UnixStream;
use std::thread;
use std::time::Duration;

use remopt_block::{LoopUnroll, Passthrough};
use remopt_exchange::{pipe_pair, ClientBridge, Endpoints, ExchangeConfig, Reactor, VecBlock};
use remopt_protocol::wire::{read_i32, write_announce, write_i32, write_record};
use remopt_protocol::{Announce, InstructionRecord, Limits, Operand};

fn block_at(base: u64, len: usize) -> Vec<InstructionRecord> {
    (0..len as u64)
        .map(|i| {
            InstructionRecord::new(
                base + i * 4,
                12,
                vec![Operand::NearAddress(base + 0x1000), Operand::Register(i as i32)],
                vec![Operand::Register(0)],
                4,
            )
            .unwrap()
        })
        .collect()
}

#[test]
fn many_clients_are_all_served() {
    const CLIENTS: u64 = 4;
    const BLOCKS: usize = 5;

    let mut reactor = Reactor::new(Box::new(Passthrough), ExchangeConfig::default());
    let mut handles = Vec::new();
    for client in 0..CLIENTS {
        let (client_end, optimizer_end) = pipe_pair().unwrap();
        reactor.add_connection(optimizer_end);
        handles.push(thread::spawn(move || {
            let mut bridge = ClientBridge::new(client_end, Limits::default());
            for len in 1..=BLOCKS {
                let block = block_at(client << 20, len);
                let mut host = VecBlock::new(block.clone());
                bridge.exchange(&mut host).unwrap();
                assert_eq!(host.instructions, block);
            }
            bridge.shutdown().unwrap();
        }));
    }

    let report = reactor.run();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(report.blocks_served, CLIENTS * BLOCKS as u64);
    assert_eq!(report.instructions, CLIENTS * 15);
    assert_eq!(report.terminated, CLIENTS as usize);
    assert_eq!(report.aborted, 0);
}

#[test]
fn shared_socket_endpoints() {
    let (client_sock, optimizer_sock) = UnixStream::pair().unwrap();
    let mut reactor = Reactor::new(Box::new(LoopUnroll), ExchangeConfig::default());
    reactor.add_connection(Endpoints::from_stream(optimizer_sock).unwrap());

    let handle = thread::spawn(move || {
        let endpoints = Endpoints::from_stream(client_sock).unwrap();
        let mut bridge = ClientBridge::new(endpoints, Limits::default());
        for base in [0x1000u64, 0x2000] {
            let mut host = VecBlock::new(block_at(base, 3));
            bridge.exchange(&mut host).unwrap();
            assert_eq!(host.instructions, block_at(base, 3));
        }
    });

    let report = reactor.run();
    handle.join().unwrap();
    assert_eq!(report.blocks_served, 2);
    assert_eq!(report.terminated, 1);
}

#[test]
fn desynced_client_is_aborted_alone() {
    let mut reactor = Reactor::new(Box::new(Passthrough), ExchangeConfig::default());

    let (mut bad, optimizer_end) = pipe_pair().unwrap();
    reactor.add_connection(optimizer_end);
    let bad_client = thread::spawn(move || {
        write_i32(&mut bad.writer, -5).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(bad.reader.read(&mut buf).unwrap(), 0);
    });

    let mut good = Vec::new();
    for client in 0..2u64 {
        let (client_end, optimizer_end) = pipe_pair().unwrap();
        reactor.add_connection(optimizer_end);
        good.push(thread::spawn(move || {
            let mut bridge = ClientBridge::new(client_end, Limits::default());
            for _ in 0..3 {
                let mut host = VecBlock::new(block_at(client << 16, 4));
                bridge.exchange(&mut host).unwrap();
            }
        }));
    }

    let report = reactor.run();
    bad_client.join().unwrap();
    for handle in good {
        handle.join().unwrap();
    }
    assert_eq!(report.aborted, 1);
    assert_eq!(report.terminated, 2);
    assert_eq!(report.blocks_served, 6);
}

#[test]
fn stalled_client_times_out_while_sibling_completes() {
    let config = ExchangeConfig {
        exchange_timeout: Some(Duration::from_millis(100)),
        ..ExchangeConfig::default()
    };
    let mut reactor = Reactor::new(Box::new(Passthrough), config);

    let (mut stalled, optimizer_end) = pipe_pair().unwrap();
    reactor.add_connection(optimizer_end);
    let stalled_client = thread::spawn(move || {
        let limits = Limits::default();
        let block = block_at(0x9000, 2);
        write_announce(&mut stalled.writer, Announce::Block { count: 2 }).unwrap();
        assert_eq!(read_i32(&mut stalled.reader).unwrap(), 2);
        write_record(&mut stalled.writer, &block[0], &limits).unwrap();
        assert_eq!(read_i32(&mut stalled.reader).unwrap(), 0);
        // Never send the second instruction; the optimizer gives up and hangs up.
        let mut buf = [0u8; 4];
        assert_eq!(stalled.reader.read(&mut buf).unwrap(), 0);
    });

    let (client_end, optimizer_end) = pipe_pair().unwrap();
    reactor.add_connection(optimizer_end);
    let sibling = thread::spawn(move || {
        let mut bridge = ClientBridge::new(client_end, Limits::default());
        let mut host = VecBlock::new(block_at(0x5000, 3));
        bridge.exchange(&mut host).unwrap();
        bridge.shutdown().unwrap();
    });

    let report = reactor.run();
    stalled_client.join().unwrap();
    sibling.join().unwrap();
    assert_eq!(report.aborted, 1);
    assert_eq!(report.terminated, 1);
    assert_eq!(report.blocks_served, 1);
}

#[test]
fn huge_announce_times_out_while_sibling_completes() {
    let config = ExchangeConfig {
        exchange_timeout: Some(Duration::from_millis(100)),
        ..ExchangeConfig::default()
    };
    let mut reactor = Reactor::new(Box::new(Passthrough), config);

    let (mut huge, optimizer_end) = pipe_pair().unwrap();
    reactor.add_connection(optimizer_end);
    let huge_client = thread::spawn(move || {
        write_i32(&mut huge.writer, i32::MAX).unwrap();
        assert_eq!(read_i32(&mut huge.reader).unwrap(), i32::MAX);
        // No instructions follow; the optimizer waits out its timeout and hangs up.
        let mut buf = [0u8; 4];
        assert_eq!(huge.reader.read(&mut buf).unwrap(), 0);
    });

    let (client_end, optimizer_end) = pipe_pair().unwrap();
    reactor.add_connection(optimizer_end);
    let sibling = thread::spawn(move || {
        let mut bridge = ClientBridge::new(client_end, Limits::default());
        let block = block_at(0x6000, 3);
        let mut host = VecBlock::new(block.clone());
        bridge.exchange(&mut host).unwrap();
        assert_eq!(host.instructions, block);
        bridge.shutdown().unwrap();
    });

    let report = reactor.run();
    huge_client.join().unwrap();
    sibling.join().unwrap();
    assert_eq!(report.aborted, 1);
    assert_eq!(report.terminated, 1);
    assert_eq!(report.blocks_served, 1);
}
