use crate::cli::InspectArgs;
use crate::inspect::{find_record, mismatch_lines, render_record};
use crate::output::load_results;
use anyhow::Result;

pub(crate) fn run_inspect(args: &InspectArgs) -> Result<()> {
    let records = load_results(&args.results)?;
    if args.mismatches {
        let lines = mismatch_lines(&records);
        for line in &lines {
            println!("{line}");
        }
        println!("{} mismatches of {} rows", lines.len(), records.len());
        return Ok(());
    }
    let index = args.index.unwrap_or_default();
    print!("{}", render_record(find_record(&records, index)?)?);
    Ok(())
}
