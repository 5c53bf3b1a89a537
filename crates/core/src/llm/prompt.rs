use crate::review::deterministic::percent_above_ceiling;
use crate::review::ReviewInput;
use std::fmt::Write;

fn instructions() -> String {
    // Keep strict: JSON only, no prose.
    [
        "You are reviewing one asset of a long-term household investment portfolio.",
        "Decide whether the investor should keep it, watch it, or replace it.",
        "Return ONLY valid JSON. Do not wrap in markdown. Do not include any extra keys.",
        "Output schema:",
        "{",
        "  \"recommendation\": \"KEEP\" | \"WATCH\" | \"REPLACE\",",
        "  \"confidence\": 0,",
        "  \"analysis\": \"short justification\",",
        "  \"substitution\": null",
        "}",
        "Rules:",
        "- confidence is an integer in [0, 100]",
        "- analysis must be non-empty, at most 3 sentences",
        "- substitution is a ticker (with a short reason) only when recommendation is REPLACE, otherwise null",
        "- a price well above the ceiling price weighs towards WATCH or REPLACE",
    ]
    .join("\n")
}

fn fmt_opt(value: Option<f64>, suffix: &str) -> String {
    match value {
        Some(v) => format!("{v:.2}{suffix}"),
        None => "unavailable".to_string(),
    }
}

pub fn build_review_prompt(input: &ReviewInput) -> String {
    let asset = &input.asset;
    let mut out = instructions();
    out.push_str("\n\nAsset:\n");

    // Writing into a String cannot fail.
    let _ = writeln!(out, "- ticker: {}", asset.ticker);
    let _ = writeln!(out, "- name: {}", asset.name);
    let _ = writeln!(out, "- type: {}", asset.asset_type.as_str());
    let _ = writeln!(out, "- portfolio: {}", input.portfolio_name);
    let _ = writeln!(out, "- current price: {}", fmt_opt(input.current_price, ""));
    let _ = writeln!(out, "- ceiling price: {}", fmt_opt(asset.ceiling_price, ""));
    let _ = writeln!(
        out,
        "- price vs ceiling: {}",
        fmt_opt(
            input
                .current_price
                .zip(asset.ceiling_price)
                .and_then(|(c, ceil)| percent_above_ceiling(c, ceil)),
            "%"
        )
    );
    let _ = writeln!(out, "- expected dividend yield: {}", fmt_opt(asset.expected_yield, "%"));

    out.push_str("\nMacro context:\n");
    let _ = writeln!(out, "- policy interest rate (Selic): {}", fmt_opt(input.macro_context.policy_rate, "%"));
    let _ = writeln!(out, "- inflation, last 12 months (IPCA): {}", fmt_opt(input.macro_context.inflation_12m, "%"));

    out.push_str("\nOriginal rationale for the recommendation:\n");
    if asset.rationale.trim().is_empty() {
        out.push_str("(none recorded)\n");
    } else {
        out.push_str(asset.rationale.trim());
        out.push('\n');
    }

    out
}
