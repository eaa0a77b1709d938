mod tests {
    use ws2801_bridge::sim::SimBus;
    use ws2801_bridge::{QuantumClock, ReceiveStatus, ReceiverAdapter};

    type Bus = SimBus<16, 64>;

    #[test]
    fn test_byte_ready_after_eighth_edge() {
        let bus = Bus::new();
        let mut sender = bus.sender(100);
        let mut clock = bus.clock();
        let mut receiver = ReceiverAdapter::new(bus.peripheral());
        sender.send(&[0x5A]).unwrap();

        clock.begin_quantum();
        clock.wait_until(500);
        assert_eq!(receiver.check(), ReceiveStatus::default());
        assert!(receiver.start_of_activity());
        assert!(!receiver.start_of_activity());

        clock.wait_until(800);
        assert_eq!(receiver.poll_byte(), Some(0x5A));
        assert_eq!(receiver.poll_byte(), None);
        assert_eq!(receiver.overflows(), 0);
    }

    #[test]
    fn test_uncollected_byte_is_overwritten() {
        let bus = Bus::new();
        let mut sender = bus.sender(100);
        let mut clock = bus.clock();
        let mut receiver = ReceiverAdapter::new(bus.peripheral());
        sender.send(&[0x01, 0x02]).unwrap();

        clock.begin_quantum();
        clock.wait_until(2000);
        let status = receiver.check();
        assert!(status.byte_ready);
        assert!(status.overflowed);
        assert_eq!(receiver.collect(status), 0x02);
        assert_eq!(receiver.overflows(), 1);

        // The latched read clears both flags
        assert_eq!(receiver.check(), ReceiveStatus::default());
    }

    #[test]
    fn test_resync_drops_partial_byte() {
        let bus = Bus::new();
        let mut sender = bus.sender(100);
        let mut clock = bus.clock();
        let mut receiver = ReceiverAdapter::new(bus.peripheral());
        sender.send(&[0xAA]).unwrap();

        clock.begin_quantum();
        clock.wait_until(400);
        receiver.resync();
        assert!(!receiver.start_of_activity());

        clock.wait_until(2000);
        assert_eq!(receiver.poll_byte(), None);
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn test_clear_activity_keeps_byte_in_flight() {
        let bus = Bus::new();
        let mut sender = bus.sender(100);
        let mut clock = bus.clock();
        let mut receiver = ReceiverAdapter::new(bus.peripheral());
        sender.send(&[0x7E]).unwrap();

        clock.begin_quantum();
        clock.wait_until(400);
        receiver.clear_activity();
        assert!(!receiver.start_of_activity());

        clock.wait_until(1000);
        assert_eq!(receiver.poll_byte(), Some(0x7E));
    }

    #[test]
    fn test_glitch_signals_start_without_data() {
        let bus = Bus::new();
        let mut sender = bus.sender(100);
        let mut clock = bus.clock();
        let mut receiver = ReceiverAdapter::new(bus.peripheral());
        sender.glitch().unwrap();

        clock.begin_quantum();
        clock.wait_until(1250);
        assert!(receiver.start_of_activity());
        assert_eq!(receiver.poll_byte(), None);
        assert_eq!(bus.late_waits(), 0);
    }
}
