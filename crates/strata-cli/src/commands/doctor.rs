use clap::Args;
use serde::Serialize;
use strata::ids::StateId;

use crate::context::Context;
use crate::format;

/// Find workspaces left dirty by a crash mid-materialize or mid-update, and
/// optionally recover them by re-running the interrupted write.
#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Re-run the interrupted materialize/update for every dirty workspace found
    #[arg(long)]
    pub fix: bool,
}

#[derive(Serialize)]
struct DoctorFinding {
    workspace: String,
    marker: String,
    recovered: bool,
}

#[derive(Serialize)]
struct DoctorOutput {
    findings: Vec<DoctorFinding>,
}

pub fn run(ctx: &Context, args: &DoctorArgs) -> strata::Result<()> {
    let repo = ctx.open()?;
    let mut findings = Vec::new();

    for info in repo.list_workspaces()? {
        if !repo.workspaces().is_dirty(&info.name) {
            continue;
        }
        let marker = repo.workspaces().read_marker(&info.name)?;
        let marker_desc = marker.as_ref().map_or_else(|| "<unreadable>".to_owned(), |m| format!("{m:?}"));
        let mut recovered = false;

        if args.fix {
            let target = match &marker {
                Some(strata::workspace::DirtyMarker::Materializing { state_id, .. }) => state_id.parse::<StateId>().ok(),
                Some(strata::workspace::DirtyMarker::Updating { to_state, .. }) => to_state.parse::<StateId>().ok(),
                None => None,
            };
            if let Some(state) = target {
                repo.restore(&info.name, state)?;
                recovered = true;
            }
        }

        findings.push(DoctorFinding { workspace: info.name.to_string(), marker: marker_desc, recovered });
    }

    let output = DoctorOutput { findings };
    format::emit(ctx, &output, |o| {
        if o.findings.is_empty() {
            println!("no dirty workspaces found");
        }
        for f in &o.findings {
            println!("{}: {} (recovered: {})", f.workspace, f.marker, f.recovered);
        }
    });
    Ok(())
}
