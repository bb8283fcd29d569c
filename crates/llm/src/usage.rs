use crate::types::Usage;

/// USD per million tokens `(model prefix, input, output)`.  Longest matching
/// prefix wins; unknown models estimate at zero so the field stays honest.
const PRICE_TABLE: &[(&str, f64, f64)] = &[
    ("gpt-5-mini", 0.25, 2.00),
    ("gpt-5", 1.25, 10.00),
    ("gpt-4.1-mini", 0.40, 1.60),
    ("gpt-4.1", 2.00, 8.00),
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4o", 2.50, 10.00),
    ("computer-use-preview", 3.00, 12.00),
];

/// Rough dollar cost of one call, for the `model_usage` event.
pub fn estimate_cost(model: &str, usage: &Usage) -> f64 {
    let mut best: Option<(&str, f64, f64)> = None;
    for (prefix, input, output) in PRICE_TABLE {
        if model.starts_with(prefix)
            && best.is_none_or(|(current, _, _)| prefix.len() > current.len())
        {
            best = Some((prefix, *input, *output));
        }
    }

    match best {
        Some((_, input_price, output_price)) => {
            (usage.input_tokens as f64 * input_price
                + usage.output_tokens as f64 * output_price)
                / 1_000_000.0
        }
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins() {
        let usage = Usage {
            input_tokens: 1_000_000,
            output_tokens: 0,
        };
        // "gpt-5-mini" must not price as "gpt-5".
        assert!((estimate_cost("gpt-5-mini-2026-01-01", &usage) - 0.25).abs() < 1e-9);
        assert!((estimate_cost("gpt-5", &usage) - 1.25).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_costs_zero() {
        let usage = Usage {
            input_tokens: 500,
            output_tokens: 500,
        };
        assert_eq!(estimate_cost("local-llama", &usage), 0.0);
    }

    #[test]
    fn mixed_usage_sums_both_sides() {
        let usage = Usage {
            input_tokens: 2_000_000,
            output_tokens: 1_000_000,
        };
        let cost = estimate_cost("gpt-4o-mini", &usage);
        assert!((cost - (2.0 * 0.15 + 0.60)).abs() < 1e-9);
    }
}
