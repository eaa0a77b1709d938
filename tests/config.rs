mod tests {
    use embassy_time::Duration;
    use ws2801_bridge::{BitTiming, BridgeConfig, ConfigError};

    #[test]
    fn test_default_config_is_valid() {
        let config = BridgeConfig::default();
        assert_eq!(config.timing, BitTiming::WS2812);
        assert_eq!(config.prefill_count, 3);
        assert_eq!(config.validate(256), Ok(()));
    }

    #[test]
    fn test_quanta_round_up() {
        let config = BridgeConfig::default();
        assert_eq!(config.quanta(Duration::from_micros(20)), 16);
        assert_eq!(config.quanta(Duration::from_micros(40)), 32);
        assert_eq!(config.quanta(Duration::from_micros(50)), 40);
        assert_eq!(config.quanta(Duration::from_micros(2)), 2);
        assert_eq!(config.quanta(Duration::from_micros(0)), 0);
    }

    #[test]
    fn test_threshold_between_pulses() {
        let timing = BitTiming::WS2812;
        assert_eq!(timing.high_ns(false), 400);
        assert_eq!(timing.high_ns(true), 850);
        assert_eq!(timing.threshold_ns(), 625);
    }

    #[test]
    fn test_phase_order() {
        let config = BridgeConfig::default().with_timing(BitTiming {
            period_ns: 1250,
            zero_high_ns: 900,
            one_high_ns: 850,
        });
        assert_eq!(config.validate(256), Err(ConfigError::PhaseOrder));

        let config = BridgeConfig::default().with_timing(BitTiming {
            period_ns: 800,
            zero_high_ns: 400,
            one_high_ns: 850,
        });
        assert_eq!(config.validate(256), Err(ConfigError::PhaseOrder));
    }

    #[test]
    fn test_prefill_limits() {
        let config = BridgeConfig::default();
        assert_eq!(
            config.validate(3),
            Err(ConfigError::PrefillExceedsCapacity {
                count: 3,
                capacity: 3
            })
        );

        let config = BridgeConfig::default().with_prefill(0, Duration::from_micros(40));
        assert_eq!(config.validate(256), Err(ConfigError::EmptyPrefill));
    }

    #[test]
    fn test_drain_timeout_bounds() {
        let config = BridgeConfig::default().with_drain_timeout(Duration::from_micros(1));
        assert_eq!(config.validate(256), Err(ConfigError::DrainTimeoutTooShort));

        let config = BridgeConfig::default().with_drain_timeout(Duration::from_micros(50));
        assert_eq!(config.validate(256), Err(ConfigError::DrainTimeoutExceedsReset));

        // 40 quanta of drain after a 850 ns low tail already reach 50 µs
        let config = BridgeConfig::default().with_drain_timeout(Duration::from_micros(49));
        assert_eq!(config.quanta(config.drain_timeout), 40);
        assert_eq!(config.validate(256), Err(ConfigError::DrainTimeoutExceedsReset));

        let config = BridgeConfig::default().with_drain_timeout(Duration::from_micros(48));
        assert_eq!(config.quanta(config.drain_timeout), 39);
        assert_eq!(config.validate(256), Ok(()));

        let config = BridgeConfig::default()
            .with_drain_timeout(Duration::from_micros(100))
            .with_reset_threshold(Duration::from_micros(280));
        assert_eq!(config.validate(256), Ok(()));
    }
}
