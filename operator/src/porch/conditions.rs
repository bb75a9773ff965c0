use crate::{
    conditions::{Condition, ConditionStatus},
    porch::ReadinessGate,
};

/// Reports whether every readiness gate has a matching condition that is True.
pub fn is_ready(gates: &[ReadinessGate], conditions: &[Condition]) -> bool {
    gates.iter().all(|gate| {
        conditions
            .iter()
            .find(|c| c.type_ == gate.condition_type)
            .is_some_and(|c| c.status == ConditionStatus::True)
    })
}

/// Reports whether any condition is scoped to a specific object of `condition_type`,
/// i.e. its type has the form `<condition_type>.<suffix>`.
pub fn has_specific_type_conditions(conditions: &[Condition], condition_type: &str) -> bool {
    let prefix = format!("{condition_type}.");
    conditions.iter().any(|c| c.type_.starts_with(&prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(type_: &str, status: ConditionStatus) -> Condition {
        Condition {
            type_: type_.to_owned(),
            status,
            ..Default::default()
        }
    }

    fn gate(condition_type: &str) -> ReadinessGate {
        ReadinessGate {
            condition_type: condition_type.to_owned(),
        }
    }

    #[test]
    fn no_gates_is_ready() {
        assert!(is_ready(&[], &[]));
    }

    #[test]
    fn all_gates_true() {
        let conditions = vec![
            condition("config.injection.WorkloadCluster.workload-cluster", ConditionStatus::True),
            condition("nephio.org.Specializer.specialize", ConditionStatus::True),
            condition("other", ConditionStatus::False),
        ];
        assert!(is_ready(
            &[
                gate("config.injection.WorkloadCluster.workload-cluster"),
                gate("nephio.org.Specializer.specialize")
            ],
            &conditions
        ));
    }

    #[test]
    fn missing_or_false_gate() {
        let conditions = vec![
            condition("a", ConditionStatus::True),
            condition("b", ConditionStatus::Unknown),
        ];
        assert!(!is_ready(&[gate("a"), gate("b")], &conditions));
        assert!(!is_ready(&[gate("a"), gate("c")], &conditions));
    }

    #[test]
    fn specific_type_conditions() {
        let conditions = vec![condition(
            "req.nephio.org/v1alpha1.Interface.n3",
            ConditionStatus::False,
        )];
        assert!(has_specific_type_conditions(
            &conditions,
            "req.nephio.org/v1alpha1"
        ));
        assert!(!has_specific_type_conditions(
            &conditions,
            "req.nephio.org/v1alpha1.Interface.n3"
        ));
        assert!(!has_specific_type_conditions(&[], "req.nephio.org/v1alpha1"));
    }
}
