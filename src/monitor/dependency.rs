//! 依赖关系校验
//!
//! 主服务到依赖服务构成有向图，级联启动/停止要求该图无环

use crate::error::{Result, ServiceWardenError};
use std::collections::{HashMap, HashSet};

/// 主服务名称 -> 依赖服务名称列表
pub type DependencyGraph = HashMap<String, Vec<String>>;

/// 校验单个监控器的依赖声明
///
/// 依赖列表包含主服务自身或重复名称时返回 `DependencyCycle`
pub fn validate_dependents(primary: &str, dependents: &[String]) -> Result<()> {
    let mut seen = HashSet::new();

    for dependent in dependents {
        if dependent == primary {
            return Err(ServiceWardenError::DependencyCycle {
                path: vec![primary.to_string(), primary.to_string()],
            });
        }
        if !seen.insert(dependent.as_str()) {
            return Err(ServiceWardenError::DependencyCycle {
                path: vec![primary.to_string(), dependent.clone(), dependent.clone()],
            });
        }
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// 查找依赖图中的环
///
/// # 返回
/// * `Option<Vec<String>>` - 存在环时返回环路径，首尾为同一服务
pub fn detect_cycle(graph: &DependencyGraph) -> Option<Vec<String>> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut stack: Vec<&str> = Vec::new();

    // 按名称排序保证结果稳定
    let mut roots: Vec<&str> = graph.keys().map(String::as_str).collect();
    roots.sort_unstable();

    for root in roots {
        if marks.contains_key(root) {
            continue;
        }
        if let Some(cycle) = visit(root, graph, &mut marks, &mut stack) {
            return Some(cycle);
        }
    }

    None
}

fn visit<'a>(
    node: &'a str,
    graph: &'a DependencyGraph,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    marks.insert(node, Mark::Visiting);
    stack.push(node);

    if let Some(children) = graph.get(node) {
        for child in children {
            match marks.get(child.as_str()) {
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|n| *n == child.as_str())?;
                    let mut path: Vec<String> =
                        stack[start..].iter().map(|n| n.to_string()).collect();
                    path.push(child.clone());
                    return Some(path);
                }
                Some(Mark::Done) => {}
                None => {
                    if let Some(cycle) = visit(child, graph, marks, stack) {
                        return Some(cycle);
                    }
                }
            }
        }
    }

    stack.pop();
    marks.insert(node, Mark::Done);
    None
}

/// 校验整个依赖图
pub fn ensure_acyclic(graph: &DependencyGraph) -> Result<()> {
    match detect_cycle(graph) {
        Some(path) => Err(ServiceWardenError::DependencyCycle { path }),
        None => Ok(()),
    }
}
