mod tests {
    use embassy_time::Duration;
    use smart_leds::{RGB8, SmartLedsWrite};
    use ws2801_bridge::sim::{SimBus, decode_bits, decode_frames, trailing_low_ns};
    use ws2801_bridge::{
        BridgeConfig, ConfigError, LateQuanta, QuantumClock, SessionState, TranslationScheduler,
    };

    type Bus = SimBus<128, 4096>;

    fn decode(bus: &Bus) -> heapless::Vec<heapless::Vec<u8, 128>, 4> {
        decode_frames(&bus.edges(), &BridgeConfig::default()).unwrap()
    }

    #[test]
    fn test_three_byte_scenario() {
        let bus = Bus::new();
        let mut sender = bus.sender(250);
        sender.send(&[0xA5, 0x00, 0xFF]).unwrap();

        let mut bridge: TranslationScheduler<_, _, _, 256> = TranslationScheduler::new(
            BridgeConfig::default(),
            bus.peripheral(),
            bus.line(),
            bus.clock(),
        )
        .unwrap();
        assert_eq!(bridge.run_for(200), SessionState::Idle);

        let edges = bus.edges();
        let bits: heapless::Vec<bool, 32> = decode_bits(&edges, BridgeConfig::default().timing).unwrap();
        let mut expected = [false; 24];
        expected[..8].copy_from_slice(&[true, false, true, false, false, true, false, true]);
        expected[16..].fill(true);
        assert_eq!(bits.as_slice(), &expected);

        assert_eq!(decode(&bus)[0].as_slice(), &[0xA5, 0x00, 0xFF]);
        assert!(trailing_low_ns(&edges, bus.now_ns()).unwrap() >= 50_000);

        let stats = bridge.stats();
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.bytes_in, 3);
        assert_eq!(stats.bytes_out, 3);
        assert_eq!(bus.late_waits(), 0);
    }

    #[test]
    fn test_pulses_are_exact_and_contiguous() {
        let bus = Bus::new();
        let mut sender = bus.sender(250);
        sender.send(&[0x0F, 0xF0]).unwrap();

        let mut bridge: TranslationScheduler<_, _, _, 64> = TranslationScheduler::new(
            BridgeConfig::default(),
            bus.peripheral(),
            bus.line(),
            bus.clock(),
        )
        .unwrap();
        bridge.run_for(100);

        let edges = bus.edges();
        assert_eq!(edges.len(), 32);
        for pair in edges.chunks(2) {
            let high = pair[1].at_ns - pair[0].at_ns;
            assert!(high == 400 || high == 850, "pulse of {high} ns");
        }
        // Every rise starts a new 1.25 µs period with no gap between bits
        for rises in edges.iter().step_by(2).collect::<Vec<_>>().windows(2) {
            assert_eq!(rises[1].at_ns - rises[0].at_ns, 1250);
        }
    }

    #[test]
    fn test_pixels_round_trip() {
        let bus = Bus::new();
        let mut sender = bus.sender(500);
        let pixels: Vec<RGB8> = (0..20u8)
            .map(|i| RGB8::new(i.wrapping_mul(13), 255 - i, i ^ 0x55))
            .collect();
        sender.write(pixels.iter().copied()).unwrap();

        let mut bridge: TranslationScheduler<_, _, _, 256> = TranslationScheduler::new(
            BridgeConfig::default(),
            bus.peripheral(),
            bus.line(),
            bus.clock(),
        )
        .unwrap();
        bridge.run_for(700);

        let expected: Vec<u8> = pixels.iter().flat_map(|p| [p.g, p.r, p.b]).collect();
        let frames = decode(&bus);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_slice(), expected.as_slice());
        assert_eq!(bridge.overflows(), 0);
        assert_eq!(bridge.state(), SessionState::Idle);
    }

    #[test]
    fn test_slow_producer_survives_drains() {
        let bus = Bus::new();
        // 12 µs per input byte against 10 µs per output byte
        let mut sender = bus.sender(1500);
        let input: Vec<u8> = (0..40u8).map(|i| i.wrapping_mul(37)).collect();
        sender.send(&input).unwrap();

        let mut bridge: TranslationScheduler<_, _, _, 256> = TranslationScheduler::new(
            BridgeConfig::default(),
            bus.peripheral(),
            bus.line(),
            bus.clock(),
        )
        .unwrap();

        let mut drains = 0;
        let mut previous = bridge.state();
        for _ in 0..800 {
            let result = bridge.tick();
            if result.state == SessionState::Streaming
                && matches!(previous, SessionState::DrainTimeout { .. })
            {
                drains += 1;
            }
            previous = result.state;
        }
        assert!(drains > 0);

        let frames = decode(&bus);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_slice(), input.as_slice());
        assert_eq!(bridge.stats().sessions, 1);
    }

    #[test]
    fn test_late_byte_joins_frame() {
        let bus = Bus::new();
        let mut sender = bus.sender(250);
        sender.send(&[0x11, 0x22, 0x33]).unwrap();
        // Lands a few quanta after the buffer drains
        sender.pause(37_000);
        sender.send(&[0x3C]).unwrap();

        let mut bridge: TranslationScheduler<_, _, _, 256> = TranslationScheduler::new(
            BridgeConfig::default(),
            bus.peripheral(),
            bus.line(),
            bus.clock(),
        )
        .unwrap();

        let mut saw_drain = false;
        let mut resumed = false;
        for _ in 0..200 {
            let result = bridge.tick();
            match result.state {
                SessionState::DrainTimeout { .. } => saw_drain = true,
                SessionState::Streaming if saw_drain => resumed = true,
                _ => {}
            }
        }
        assert!(saw_drain);
        assert!(resumed);

        let frames = decode(&bus);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_slice(), &[0x11, 0x22, 0x33, 0x3C]);
        assert_eq!(bridge.stats().sessions, 1);
    }

    #[test]
    fn test_byte_at_end_of_longest_drain_joins_frame() {
        let bus = Bus::new();
        let mut sender = bus.sender(300);
        sender.send(&[0x11, 0x22, 0x33]).unwrap();

        let config = BridgeConfig::default().with_drain_timeout(Duration::from_micros(48));
        let mut bridge: TranslationScheduler<_, _, _, 256> =
            TranslationScheduler::new(config, bus.peripheral(), bus.line(), bus.clock()).unwrap();
        let last = bridge.limits().drain - 1;

        // Stop one quantum before the drain gives up
        for _ in 0..400 {
            if bridge.state() == (SessionState::DrainTimeout { waited: last }) {
                break;
            }
            bridge.tick();
        }
        assert_eq!(bridge.state(), SessionState::DrainTimeout { waited: last });

        // 800 ns byte, complete before the last drain quantum looks
        bus.sender(100).send(&[0x3C]).unwrap();
        assert_eq!(bridge.tick().state, SessionState::Streaming);
        bridge.run_for(200);

        let frames: heapless::Vec<heapless::Vec<u8, 8>, 4> =
            decode_frames(&bus.edges(), &config).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_slice(), &[0x11, 0x22, 0x33, 0x3C]);
        assert_eq!(bridge.stats().sessions, 1);
    }

    #[test]
    fn test_two_microsecond_bytes_at_any_phase() {
        let input: Vec<u8> = (0..60u8).map(|i| i.wrapping_mul(29) ^ 0xA5).collect();
        for lead in 0..25u64 {
            let bus: SimBus<64, 1024> = SimBus::new();
            let mut sender = bus.sender(250);
            sender.pause(lead * 50);
            sender.send(&input).unwrap();

            let mut bridge: TranslationScheduler<_, _, _, 256> = TranslationScheduler::new(
                BridgeConfig::default(),
                bus.peripheral(),
                bus.line(),
                bus.clock(),
            )
            .unwrap();
            bridge.run_for(700);

            let frames: heapless::Vec<heapless::Vec<u8, 64>, 2> =
                decode_frames(&bus.edges(), &BridgeConfig::default()).unwrap();
            assert_eq!(frames.len(), 1, "lead {lead} ns");
            assert_eq!(frames[0].as_slice(), input.as_slice(), "lead {lead} ns");
            assert_eq!(bridge.overflows(), 0, "lead {lead} ns");
        }
    }

    /// Clock that reports every deadline of its first `late` waits as missed
    struct SlowClock<C> {
        inner: C,
        late: u32,
    }

    impl<C: QuantumClock> QuantumClock for SlowClock<C> {
        fn begin_quantum(&mut self) {
            self.inner.begin_quantum();
        }

        fn wait_until(&mut self, offset_ns: u32) -> bool {
            let late = self.inner.wait_until(offset_ns);
            if self.late > 0 {
                self.late -= 1;
                return true;
            }
            late
        }
    }

    #[test]
    fn test_late_quanta_counted_per_state() {
        let bus = Bus::new();
        let clock = SlowClock {
            inner: bus.clock(),
            late: 6,
        };
        let mut bridge: TranslationScheduler<_, _, _, 64> = TranslationScheduler::new(
            BridgeConfig::default(),
            bus.peripheral(),
            bus.line(),
            clock,
        )
        .unwrap();

        // Two waits per quantum: three late idle quanta
        for _ in 0..3 {
            assert!(bridge.tick().late);
        }
        assert!(!bridge.tick().late);
        assert_eq!(
            bridge.stats().late_quanta,
            LateQuanta {
                idle: 3,
                ..LateQuanta::default()
            }
        );

        bus.sender(250).send(&[0x01, 0x02, 0x03]).unwrap();
        while !bridge.state().is_streaming() {
            bridge.tick();
        }
        bridge.clock_mut().late = 1;
        let result = bridge.tick();
        assert!(result.late);
        assert_eq!(result.emitted, Some(false));

        let late = bridge.stats().late_quanta;
        assert_eq!(late.streaming, 1);
        assert_eq!(late.prefill, 0);
        assert_eq!(late.total(), 4);
        assert_eq!(bus.late_waits(), 0);
    }

    #[test]
    fn test_sessions_stay_separate() {
        let bus = Bus::new();
        let mut sender = bus.sender(250);
        sender.send(&[1, 2, 3, 4]).unwrap();
        sender.pause(200_000);
        sender.send(&[5, 6, 7]).unwrap();

        let mut bridge: TranslationScheduler<_, _, _, 256> = TranslationScheduler::new(
            BridgeConfig::default(),
            bus.peripheral(),
            bus.line(),
            bus.clock(),
        )
        .unwrap();
        bridge.run_for(400);

        let frames = decode(&bus);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_slice(), &[1, 2, 3, 4]);
        assert_eq!(frames[1].as_slice(), &[5, 6, 7]);
        assert_eq!(bridge.stats().sessions, 2);
        assert_eq!(bridge.stats().bytes_out, 3);
    }

    #[test]
    fn test_quick_restart_waits_for_latch() {
        let bus = Bus::new();
        let mut sender = bus.sender(250);
        sender.send(&[1, 2, 3, 4]).unwrap();
        // Second session starts right after the first one times out
        sender.pause(62_000);
        sender.send(&[9, 8, 7]).unwrap();

        let mut bridge: TranslationScheduler<_, _, _, 256> = TranslationScheduler::new(
            BridgeConfig::default(),
            bus.peripheral(),
            bus.line(),
            bus.clock(),
        )
        .unwrap();
        bridge.run_for(400);

        let frames = decode(&bus);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_slice(), &[1, 2, 3, 4]);
        assert_eq!(frames[1].as_slice(), &[9, 8, 7]);
    }

    #[test]
    fn test_noise_start_is_ignored() {
        let bus = Bus::new();
        let mut sender = bus.sender(250);
        sender.glitch().unwrap();

        let mut bridge: TranslationScheduler<_, _, _, 64> = TranslationScheduler::new(
            BridgeConfig::default(),
            bus.peripheral(),
            bus.line(),
            bus.clock(),
        )
        .unwrap();

        let mut saw_prefill = false;
        for _ in 0..100 {
            saw_prefill |= matches!(bridge.tick().state, SessionState::Prefill { .. });
        }
        assert!(saw_prefill);
        assert_eq!(bridge.state(), SessionState::Idle);
        assert!(bus.edges().is_empty());

        let stats = bridge.stats();
        assert_eq!(stats.noise_starts, 1);
        assert_eq!(stats.sessions, 0);
    }

    #[test]
    fn test_frame_after_noise() {
        let bus = Bus::new();
        let mut sender = bus.sender(250);
        sender.glitch().unwrap();
        sender.pause(100_000);
        sender.send(&[0x42, 0x43, 0x44]).unwrap();

        let mut bridge: TranslationScheduler<_, _, _, 64> = TranslationScheduler::new(
            BridgeConfig::default(),
            bus.peripheral(),
            bus.line(),
            bus.clock(),
        )
        .unwrap();
        bridge.run_for(300);

        let frames = decode(&bus);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_slice(), &[0x42, 0x43, 0x44]);
        assert_eq!(bridge.stats().noise_starts, 1);
    }

    #[test]
    fn test_short_frame_is_not_noise() {
        let bus = Bus::new();
        let mut sender = bus.sender(250);
        sender.send(&[0x81]).unwrap();

        let mut bridge: TranslationScheduler<_, _, _, 64> = TranslationScheduler::new(
            BridgeConfig::default(),
            bus.peripheral(),
            bus.line(),
            bus.clock(),
        )
        .unwrap();
        bridge.run_for(150);

        let frames = decode(&bus);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_slice(), &[0x81]);
        assert_eq!(bridge.stats().noise_starts, 0);
    }

    #[test]
    fn test_buffer_overrun_is_fail_soft() {
        let bus = Bus::new();
        // 2.4 µs per input byte into an 8-byte ring drained at 10 µs per byte
        let mut sender = bus.sender(300);
        let input: Vec<u8> = (0..48u8).collect();
        sender.send(&input).unwrap();

        let mut bridge: TranslationScheduler<_, _, _, 8> = TranslationScheduler::new(
            BridgeConfig::default(),
            bus.peripheral(),
            bus.line(),
            bus.clock(),
        )
        .unwrap();
        bridge.run_for(1000);

        // Data is lost, but every emitted pulse is still well formed
        let emitted: usize = decode(&bus).iter().map(|frame| frame.len()).sum();
        assert!(emitted > 0);
        assert!(emitted < input.len());
        assert_eq!(bridge.overflows(), 0);
        assert_eq!(bridge.state(), SessionState::Idle);
        assert_eq!(bus.late_waits(), 0);
    }

    #[test]
    fn test_rejects_config_too_large_for_buffer() {
        let bus = Bus::new();
        let result: Result<TranslationScheduler<_, _, _, 2>, _> = TranslationScheduler::new(
            BridgeConfig::default(),
            bus.peripheral(),
            bus.line(),
            bus.clock(),
        );
        assert_eq!(
            result.err(),
            Some(ConfigError::PrefillExceedsCapacity {
                count: 3,
                capacity: 2
            })
        );
    }

    #[test]
    fn test_longer_reset_threshold() {
        let bus = Bus::new();
        let mut sender = bus.sender(250);
        sender.send(&[0xC3, 0x3C]).unwrap();

        let config = BridgeConfig::default()
            .with_drain_timeout(Duration::from_micros(100))
            .with_reset_threshold(Duration::from_micros(280));
        let mut bridge: TranslationScheduler<_, _, _, 64> =
            TranslationScheduler::new(config, bus.peripheral(), bus.line(), bus.clock()).unwrap();
        assert_eq!(bridge.limits().drain, 80);
        assert_eq!(bridge.limits().reset, 224);

        bridge.run_for(150);
        assert_eq!(bridge.state(), SessionState::Idle);
        let frames: heapless::Vec<heapless::Vec<u8, 8>, 2> =
            decode_frames(&bus.edges(), &config).unwrap();
        assert_eq!(frames[0].as_slice(), &[0xC3, 0x3C]);
    }
}
