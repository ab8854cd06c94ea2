//! Picking the top pose out of Vina's multi-model output.

const MODEL: &str = "MODEL";
const ENDMDL: &str = "ENDMDL";

/// The first `MODEL ... ENDMDL` block without its delimiters. Text without
/// any MODEL record is returned unchanged.
pub fn top_pose(output: &str) -> String {
    let mut lines = output.lines();
    if !lines.by_ref().any(|l| l.split_whitespace().next() == Some(MODEL)) {
        return output.to_string();
    }

    let mut pose: String = lines
        .take_while(|l| !l.starts_with(ENDMDL))
        .collect::<Vec<_>>()
        .join("\n");
    pose.push('\n');
    pose
}

/// Receptor followed by the docked pose, the layout of the "full complex" download.
pub fn complex(receptor: &str, pose: &str) -> String {
    format!("{}\n{}", receptor, pose)
}

/// Number of `MODEL` records, i.e. poses Vina wrote.
pub fn model_count(output: &str) -> usize {
    output
        .lines()
        .filter(|l| l.split_whitespace().next() == Some(MODEL))
        .count()
}
