/// Lists the ways a persisted `(component_order, func_blocks)` pair breaks
/// the run invariants. An empty list means the pair is a valid signature.
pub fn validate(component_order: &[String], func_blocks: &[Vec<String>]) -> Vec<String> {
    let mut errors = vec![];

    // Both sequences describe the same runs.
    if component_order.len() != func_blocks.len() {
        errors.push(format!(
            "component_order has {} entries but func_blocks has {}",
            component_order.len(),
            func_blocks.len()
        ));
    }

    for (run_index, component) in component_order.iter().enumerate() {
        if component.is_empty() {
            errors.push(format!("Run #{run_index} has an empty component name"));
        }
    }

    // Run-length encoding never leaves two equal neighbours.
    for (run_index, pair) in component_order.windows(2).enumerate() {
        if pair[0] == pair[1] {
            errors.push(format!(
                "Runs #{run_index} and #{} both belong to component {:?}",
                run_index + 1,
                pair[0]
            ));
        }
    }

    // A run exists only because some frame contributed tokens to it.
    for (run_index, tokens) in func_blocks.iter().enumerate() {
        if tokens.is_empty() {
            errors.push(format!("Run #{run_index} has no function tokens"));
        }
    }

    errors
}

#[cfg(test)]
mod test {
    use super::validate;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|&item| item.to_owned()).collect()
    }

    #[test]
    fn valid_signature() {
        assert!(validate(&strings(&["X", "Y", "X"]), &[strings(&["a"]), strings(&["b"]), strings(&["c"])]).is_empty());
        assert!(validate(&[], &[]).is_empty());
    }

    #[test]
    fn reports_every_violation() {
        let errors = validate(&strings(&["X", "X", ""]), &[strings(&["a"]), vec![]]);
        assert_eq!(errors.len(), 4);
        assert!(errors[0].contains("3 entries"));
    }
}
