//! 3Dmol.js scene for a docked complex.
//!
//! The receptor is drawn as a translucent gray cartoon and the docked pose as
//! green-carbon sticks, then the camera is framed on both.

pub const VIEWER_SCRIPT_URL: &str = "https://3Dmol.org/build/3Dmol-min.js";
pub const VIEWER_WIDTH: u32 = 700;
pub const VIEWER_HEIGHT: u32 = 500;

/// Encode `text` as a JavaScript string literal that is safe inside a
/// `<script>` element.
fn js_string(text: &str) -> String {
    serde_json::to_string(text)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace("</", "<\\/")
}

/// HTML fragment rendering `receptor` and `ligand` (both PDBQT) into a
/// viewer with DOM id `element_id`.
pub fn render_scene(element_id: &str, receptor: &str, ligand: &str) -> String {
    format!(
        r#"<div id="{id}" class="viewer" style="width:{w}px; height:{h}px; position:relative;"></div>
<script src="{src}"></script>
<script>
(function() {{
    var viewer = $3Dmol.createViewer(document.getElementById("{id}"), {{ backgroundColor: "white" }});
    viewer.addModel({receptor}, "pdbqt");
    viewer.setStyle({{ model: -1 }}, {{ cartoon: {{ color: "gray", opacity: 0.7 }} }});
    viewer.addModel({ligand}, "pdbqt");
    viewer.setStyle({{ model: -1 }}, {{ stick: {{ colorscheme: "greenCarbon" }} }});
    viewer.zoomTo();
    viewer.render();
}})();
</script>"#,
        id = element_id,
        w = VIEWER_WIDTH,
        h = VIEWER_HEIGHT,
        src = VIEWER_SCRIPT_URL,
        receptor = js_string(receptor),
        ligand = js_string(ligand),
    )
}
