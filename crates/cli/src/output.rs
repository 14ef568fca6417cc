use crate::error::CliError;
use engine_core::metrics::MetricsSummary;
use engine_runtime::execution::parallel::RangeOutcome;
use serde_json::json;

pub fn print_summary(summary: &MetricsSummary, as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("{summary}");
    }
    Ok(())
}

pub fn print_outcomes(outcomes: &[RangeOutcome], as_json: bool) -> Result<(), CliError> {
    if as_json {
        let ranges: Vec<_> = outcomes
            .iter()
            .map(|outcome| match &outcome.result {
                Ok(summary) => json!({
                    "start": outcome.range.start,
                    "end": outcome.range.end,
                    "summary": summary,
                }),
                Err(err) => json!({
                    "start": outcome.range.start,
                    "end": outcome.range.end,
                    "error": err.to_string(),
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&ranges)?);
        return Ok(());
    }

    for outcome in outcomes {
        println!("Range [{}, {})", outcome.range.start, outcome.range.end);
        println!("-----------------------------");
        match &outcome.result {
            Ok(summary) => println!("{summary}"),
            Err(err) => println!("Failed: {err}"),
        }
        println!();
    }
    Ok(())
}
