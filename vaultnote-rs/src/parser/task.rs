//! Task tree construction from classified checklist lines.

use crate::parser::line::{Line, LineKind};
use serde::Serialize;
use std::ops::Range;

/// A checklist item and the items nested under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskNode {
    /// 0-based line index of the checklist line.
    pub line: usize,
    /// Nesting depth (root = 0).
    pub depth: usize,
    /// Leading spaces as written.
    pub indent: usize,
    pub marker: char,
    pub checked: bool,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TaskNode>,
}

impl TaskNode {
    /// This node and all its descendants, depth first.
    pub fn walk(&self) -> Vec<&TaskNode> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

/// Flatten a forest in document order.
pub fn flatten(forest: &[TaskNode]) -> Vec<&TaskNode> {
    forest.iter().flat_map(TaskNode::walk).collect()
}

/// Build the task forest for the lines in `range`.
///
/// Depth comes from a stack of `(indent, depth)` pairs: entries at the same or
/// deeper indentation are popped, and the new item sits one level below what
/// remains. Headings end all nesting; a non-blank non-task line pops every
/// entry at or beyond its own indentation.
pub fn build_task_forest(lines: &[Line], range: Range<usize>) -> Vec<TaskNode> {
    let mut forest: Vec<TaskNode> = Vec::new();
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for idx in range {
        let Some(line) = lines.get(idx) else { break };

        match line.kind() {
            LineKind::Checklist(item) => {
                while stack.last().is_some_and(|&(indent, _)| indent >= item.indent) {
                    stack.pop();
                }
                let depth = stack.last().map_or(0, |&(_, depth)| depth + 1);
                stack.push((item.indent, depth));

                let node = TaskNode {
                    line: idx,
                    depth,
                    indent: item.indent,
                    marker: item.marker,
                    checked: item.checked,
                    text: item.text.clone(),
                    children: Vec::new(),
                };
                attach(&mut forest, node, depth);
            }
            LineKind::Blank => {}
            LineKind::Heading { .. } | LineKind::HeaderDelimiter | LineKind::Metadata => stack.clear(),
            LineKind::Opaque => {
                let line_indent = count_indent(line.body());
                while stack.last().is_some_and(|&(indent, _)| indent >= line_indent) {
                    stack.pop();
                }
            }
        }
    }

    forest
}

/// Place `node` as the last child along the rightmost path, `depth` levels down.
fn attach(siblings: &mut Vec<TaskNode>, node: TaskNode, depth: usize) {
    match siblings.last_mut() {
        Some(last) if depth > 0 => attach(&mut last.children, node, depth - 1),
        _ => siblings.push(node),
    }
}

/// Leading whitespace width, tabs counted as one column each.
pub fn count_indent(s: &str) -> usize {
    s.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::line::classify;

    fn forest(text: &str) -> Vec<TaskNode> {
        let lines = classify(text).lines;
        let len = lines.len();
        build_task_forest(&lines, 0..len)
    }

    fn depths(text: &str) -> Vec<usize> {
        flatten(&forest(text)).iter().map(|t| t.depth).collect()
    }

    #[test]
    fn test_depth_normalization() {
        let text = "- [ ] a\n  - [ ] b\n  - [ ] c\n    - [ ] d\n- [ ] e\n";
        assert_eq!(depths(text), vec![0, 1, 1, 2, 0]);

        let roots = forest(text);
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].children.len(), 2);
        assert_eq!(roots[0].children[1].children[0].text, "d");
        assert_eq!(roots[1].text, "e");
    }

    #[test]
    fn test_irregular_indentation() {
        // Widths 0, 4, 2: the 2-wide item pops the 4-wide one and is a sibling.
        assert_eq!(depths("- [ ] a\n    - [ ] b\n  - [ ] c\n"), vec![0, 1, 1]);
        // A first item that is indented is still a root.
        assert_eq!(depths("   - [ ] a\n - [ ] b\n"), vec![0, 0]);
    }

    #[test]
    fn test_paragraph_breaks_nesting() {
        let text = "- [ ] a\n  - [ ] b\nSome prose\n  - [ ] c\n";
        assert_eq!(depths(text), vec![0, 1, 0]);
    }

    #[test]
    fn test_indented_continuation_keeps_nesting() {
        let text = "- [ ] a\n  continued note\n  - [ ] b\n";
        assert_eq!(depths(text), vec![0, 1]);
    }

    #[test]
    fn test_blank_lines_and_headings() {
        let text = "- [ ] a\n\n  - [ ] b\n## Next\n  - [ ] c\n";
        let roots = forest(text);
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].children[0].text, "b");
        assert_eq!(roots[1].text, "c");
        assert_eq!(roots[1].depth, 0);
    }

    #[test]
    fn test_node_fields() {
        let roots = forest("intro\n* [x] done item\n");
        assert_eq!(
            roots,
            vec![TaskNode {
                line: 1,
                depth: 0,
                indent: 0,
                marker: '*',
                checked: true,
                text: "done item".to_string(),
                children: Vec::new(),
            }]
        );
    }

    #[test]
    fn test_count_indent() {
        assert_eq!(count_indent(""), 0);
        assert_eq!(count_indent("  x"), 2);
        assert_eq!(count_indent("\t x"), 2);
    }
}
