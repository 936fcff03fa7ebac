//! Read-only receive counters, fetched fresh from the runtime on every query.
//!
//! All counters are monotonic and owned by the client runtime; this crate
//! only reads them. [`Counter`] names each one so hosts can expose them as
//! individual read-only properties.

use std::sync::Arc;

use crate::channel::StreamIdentity;
use crate::error::{Result, VqeError};
use crate::runtime::ClientRuntime;

macro_rules! counters {
    ($( $(#[$doc:meta])* $field:ident => $variant:ident, $name:literal, $blurb:literal; )*) => {
        /// Snapshot of the runtime's counters at one instant.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct Stats {
            $( $(#[$doc])* pub $field: u64, )*
        }

        impl Stats {
            /// Add every counter of `other` into `self`.
            pub fn accumulate(&mut self, other: &Stats) {
                $( self.$field = self.$field.saturating_add(other.$field); )*
            }
        }

        /// One named counter of a [`Stats`] snapshot.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Counter {
            $( $variant, )*
        }

        impl Counter {
            pub const ALL: &'static [Counter] = &[ $( Counter::$variant, )* ];

            /// Property-style name, e.g. `primary-rtp-inputs`.
            pub fn name(&self) -> &'static str {
                match self {
                    $( Counter::$variant => $name, )*
                }
            }

            pub fn blurb(&self) -> &'static str {
                match self {
                    $( Counter::$variant => $blurb, )*
                }
            }

            /// Project this counter out of a snapshot.
            pub fn read(&self, stats: &Stats) -> u64 {
                match self {
                    $( Counter::$variant => stats.$field, )*
                }
            }

            pub fn from_name(name: &str) -> Option<Counter> {
                Counter::ALL.iter().copied().find(|c| c.name() == name)
            }
        }
    };
}

counters! {
    primary_udp_inputs => PrimaryUdpInputs, "primary-udp-inputs",
        "primary udp mpeg pkts received";
    primary_udp_drops => PrimaryUdpDrops, "primary-udp-drops",
        "primary udp mpeg pkts dropped, due to a failure to have a valid MPEG sync byte as the first byte in the pkt payload";
    primary_rtp_inputs => PrimaryRtpInputs, "primary-rtp-inputs",
        "primary rtp pkts received";
    primary_rtp_drops => PrimaryRtpDrops, "primary-rtp-drops",
        "primary rtp pkts dropped (RTP parse failure, too early, too late, source filter); excludes duplicates";
    primary_rtp_drops_late => PrimaryRtpDropsLate, "primary-rtp-drops-late",
        "primary rtp pkts dropped due to arriving too late for playout";
    primary_rtcp_inputs => PrimaryRtcpInputs, "primary-rtcp-inputs",
        "primary rtcp pkts received";
    primary_rtcp_outputs => PrimaryRtcpOutputs, "primary-rtcp-outputs",
        "primary rtcp pkts sent";
    repair_rtp_inputs => RepairRtpInputs, "repair-rtp-inputs",
        "repair/rcc rtp pkts received";
    repair_rtp_drops => RepairRtpDrops, "repair-rtp-drops",
        "repair/rcc rtp pkts dropped (parse failure, too early, too late, preceding the RCC start sequence); excludes duplicates";
    repair_rtp_drops_late => RepairRtpDropsLate, "repair-rtp-drops-late",
        "repair/rcc rtp pkts dropped due to arriving too late for playout";
    repair_rtcp_inputs => RepairRtcpInputs, "repair-rtcp-input",
        "repair/rcc rtcp pkts received";
    fec_inputs => FecInputs, "fec-inputs",
        "fec pkts received";
    fec_drops => FecDrops, "fec-drops",
        "fec pkts dropped (invalid RTP or FEC header, too late, allocation failure)";
    fec_drops_late => FecDropsLate, "fec-drops-late",
        "fec pkts which arrived after the primary packet they protect was scheduled for output";
    repair_rtp_stun_inputs => RepairRtpStunInputs, "repair-rtp-stun-inputs",
        "STUN pkts received on the repair rtp port";
    repair_rtp_stun_outputs => RepairRtpStunOutputs, "repair-rtp-stun-outputs",
        "STUN pkts sent on the repair rtp port";
    repair_rtcp_stun_inputs => RepairRtcpStunInputs, "repair-rtcp-stun-inputs",
        "STUN pkts received on the repair rtcp port";
    repair_rtcp_stun_outputs => RepairRtcpStunOutputs, "repair-rtcp-stun-outputs",
        "STUN pkts sent on the repair rtcp port";
    post_repair_outputs => PostRepairOutputs, "post-repair-outputs",
        "post repair stream pkts (common to all tuners on the same channel)";
    tuner_queue_drops => TunerQueueDrops, "tuner-queue-drops",
        "drops during pkt enqueue on a tuner (e.g. queue limit reached)";
    underruns => Underruns, "underruns",
        "underruns upon inserting pkts of the input streams";
    pre_repair_losses => PreRepairLosses, "pre-repair-losses",
        "primary rtp pkts missing from the stream before repair (1,4,5,7,8 counts 3)";
    post_repair_losses => PostRepairLosses, "post-repair-losses",
        "rtp pkts still missing (not repaired) upon output to the tuner";
    post_repair_losses_rcc => PostRepairLossesRcc, "post-repair-losses-rcc",
        "rcc burst pkts still missing (not repaired) upon output to the tuner";
    repairs_requested => RepairsRequested, "repairs-requested",
        "repair pkts requested";
    repairs_policed => RepairsPoliced, "repairs-policed",
        "repair requests not sent due to rate limiting";
    fec_recovered_paks => FecRecoveredPaks, "fec-recovered-paks",
        "pkts successfully regenerated by FEC";
}

/// Fetch a fresh snapshot: per stream when `identity` is known, otherwise
/// the runtime-wide totals. Nothing is cached between calls.
pub fn snapshot(
    runtime: &Arc<dyn ClientRuntime>,
    identity: Option<&StreamIdentity>,
) -> Result<Stats> {
    let result = match identity {
        Some(identity) => runtime.stream_stats(identity),
        None => runtime.stats(),
    };
    result.map_err(|e| match e {
        VqeError::Stats(_) => e,
        other => VqeError::Stats(other.to_string()),
    })
}

/// Fetch a fresh snapshot and project one counter out of it.
pub fn query(
    runtime: &Arc<dyn ClientRuntime>,
    identity: Option<&StreamIdentity>,
    counter: Counter,
) -> Result<u64> {
    snapshot(runtime, identity).map(|stats| counter.read(&stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::mock::MockRuntime;

    #[test]
    fn names_are_unique_and_resolvable() {
        let mut names: Vec<_> = Counter::ALL.iter().map(|c| c.name()).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        assert_eq!(
            Counter::from_name("post-repair-outputs"),
            Some(Counter::PostRepairOutputs)
        );
        assert_eq!(Counter::from_name("nope"), None);
    }

    #[test]
    fn rtcp_input_keeps_established_property_name() {
        assert_eq!(Counter::RepairRtcpInputs.name(), "repair-rtcp-input");
        assert_eq!(Counter::from_name("repair-rtcp-inputs"), None);
    }

    #[test]
    fn accumulate_sums_every_field() {
        let mut a = Stats {
            primary_rtp_inputs: 3,
            fec_inputs: 1,
            ..Stats::default()
        };
        let b = Stats {
            primary_rtp_inputs: 4,
            underruns: 2,
            ..Stats::default()
        };
        a.accumulate(&b);
        assert_eq!(a.primary_rtp_inputs, 7);
        assert_eq!(a.fec_inputs, 1);
        assert_eq!(a.underruns, 2);
    }

    #[test]
    fn every_query_refetches() {
        let mock = Arc::new(MockRuntime::new());
        let runtime: Arc<dyn ClientRuntime> = mock.clone();

        mock.set_stats(Stats {
            primary_rtp_inputs: 10,
            ..Stats::default()
        });
        assert_eq!(query(&runtime, None, Counter::PrimaryRtpInputs).unwrap(), 10);

        mock.set_stats(Stats {
            primary_rtp_inputs: 25,
            ..Stats::default()
        });
        assert_eq!(query(&runtime, None, Counter::PrimaryRtpInputs).unwrap(), 25);
        assert_eq!(mock.stats_calls(), 2);
    }

    #[test]
    fn fetch_failure_is_a_resource_error() {
        let mock = Arc::new(MockRuntime::new());
        mock.fail_stats(true);
        let runtime: Arc<dyn ClientRuntime> = mock;
        let err = query(&runtime, None, Counter::Underruns).unwrap_err();
        assert!(matches!(err, VqeError::Stats(_)));
        assert!(!err.is_fatal());
    }
}
