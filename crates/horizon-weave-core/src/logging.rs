//! Logging and debugging facilities for Horizon Weave.
//!
//! Horizon Weave uses the `tracing` crate for instrumentation. Install a
//! subscriber in the host application to see the output:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_weave=debug,horizon_weave_core=info")
//!     .init();
//! ```
//!
//! Use [`WidgetTreeDebug`] for a readable view of an object tree, optionally
//! annotated with per-node payload information.

use std::fmt::{self, Write as FmtWrite};

use crate::object::{ObjectId, ObjectResult, ObjectTree};

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Event loop target.
    pub const EVENT_LOOP: &str = "horizon_weave_core::event_loop";
    /// Timer target.
    pub const TIMER: &str = "horizon_weave_core::timer";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "horizon_weave_core::signal";
    /// Property system target.
    pub const PROPERTY: &str = "horizon_weave_core::property";
    /// Object tree target.
    pub const OBJECT: &str = "horizon_weave_core::object";
    /// Reference resolution target.
    pub const RESOLVER: &str = "horizon_weave::resolver";
    /// Condition evaluation target.
    pub const EVALUATOR: &str = "horizon_weave::evaluator";
    /// Conditional property registration target.
    pub const REGISTRAR: &str = "horizon_weave::registrar";
    /// Live reference propagation target.
    pub const PROPAGATOR: &str = "horizon_weave::propagator";
    /// Record set composition target.
    pub const COMPOSER: &str = "horizon_weave::composer";
}

const PIPE: &str = "\u{2502}   ";
const TEE: &str = "\u{251c}\u{2500}\u{2500} ";
const CORNER: &str = "\u{2514}\u{2500}\u{2500} ";

type Annotator<'a, T> = Box<dyn Fn(&T) -> Option<String> + 'a>;

/// Debug utility for visualizing an [`ObjectTree`].
pub struct WidgetTreeDebug<'a, T> {
    tree: &'a ObjectTree<T>,
    show_state: bool,
    annotate: Option<Annotator<'a, T>>,
}

impl<'a, T> WidgetTreeDebug<'a, T> {
    /// Create a visualizer with state flags shown.
    pub fn new(tree: &'a ObjectTree<T>) -> Self {
        Self {
            tree,
            show_state: true,
            annotate: None,
        }
    }

    /// Show or hide the `hidden`/`disabled` flags.
    pub fn with_state(mut self, show_state: bool) -> Self {
        self.show_state = show_state;
        self
    }

    /// Append the annotator's text (if any) to every node line.
    pub fn with_annotation<F>(mut self, annotate: F) -> Self
    where
        F: Fn(&T) -> Option<String> + 'a,
    {
        self.annotate = Some(Box::new(annotate));
        self
    }

    /// Format every root of the tree.
    pub fn format_all(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Widget Tree ({} widgets):", self.tree.object_count());
        let roots: Vec<ObjectId> = self.tree.root_objects().collect();
        if roots.is_empty() {
            output.push_str("  (empty)\n");
        }
        for root in roots {
            // Roots come straight from the tree.
            let _ = self.format_into(root, &mut Vec::new(), &mut output);
        }
        output
    }

    // `open` holds, per ancestor level, whether that ancestor has siblings below it.
    fn format_into(&self, id: ObjectId, open: &mut Vec<bool>, output: &mut String) -> ObjectResult<()> {
        if let Some((last, parents)) = open.split_last() {
            for &has_more in parents {
                output.push_str(if has_more { PIPE } else { "    " });
            }
            output.push_str(if *last { TEE } else { CORNER });
        }

        output.push_str(self.tree.name(id)?);
        if self.show_state {
            let state = self.tree.widget_state(id)?;
            if !state.visible {
                output.push_str(" [hidden]");
            }
            if !state.enabled {
                output.push_str(" [disabled]");
            }
        }
        if let Some(annotate) = &self.annotate {
            if let Some(note) = annotate(self.tree.payload(id)?) {
                let _ = write!(output, " = {note}");
            }
        }
        output.push('\n');

        let children = self.tree.children(id)?;
        for (i, &child) in children.iter().enumerate() {
            open.push(i + 1 < children.len());
            self.format_into(child, open, output)?;
            open.pop();
        }
        Ok(())
    }
}

impl<T> fmt::Display for WidgetTreeDebug<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_all())
    }
}
