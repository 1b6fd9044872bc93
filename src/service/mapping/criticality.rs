//! Triage criticality of Windows Security event ids

use crate::model::EventCriticality;

/// Criticality of a Windows event id; unlisted ids are low
pub fn event_criticality(event_id: u32) -> EventCriticality {
    match event_id {
        // monitored pattern, replay attack, audit policy change, SID history,
        // DSRM password attempt, role separation, special groups logon
        4618 | 4649 | 4719 | 4765 | 4766 | 4794 | 4897 | 4964 => EventCriticality::High,
        // possible DoS, audit log cleared (current and legacy ids)
        550 | 1102 | 517 => EventCriticality::High,
        // administrator recovery, SID filtering, DPAPI master key backup/recovery
        4621 | 4675 | 4692 | 4693 => EventCriticality::Medium,
        _ => EventCriticality::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_ids() {
        assert_eq!(event_criticality(1102), EventCriticality::High);
        assert_eq!(event_criticality(4719), EventCriticality::High);
        assert_eq!(event_criticality(4692), EventCriticality::Medium);
        assert_eq!(event_criticality(4624), EventCriticality::Low);
        assert_eq!(event_criticality(0), EventCriticality::Low);
    }
}
