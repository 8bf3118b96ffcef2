//! Document walker.

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::{debug, info, warn};

use super::scope::{Scope, Target};
use crate::common::{Result, StatsError};
use crate::config::StatsConfig;
use crate::expr::ast::{Expression, HistogramCall};
use crate::histogram::HistogramFunctionRegistry;
use crate::report::{Report, Trigger, TriggerRole};
use crate::sim::path::substitute;
use crate::sim::tree::SimTree;
use crate::statistic::SnapshotMode;

const MAX_INCLUDE_DEPTH: usize = 32;
const HIST_DEF_PREFIX: &str = "hist_def.";
const ARCH_CONTENT_SUFFIX: &str = "-arch-content";

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn report_mut<'r>(root: &'r mut Report, path: &[usize]) -> Result<&'r mut Report> {
    let mut report = root;
    for index in path {
        report = report
            .subreports_mut()
            .get_mut(*index)
            .ok_or_else(|| StatsError::BadParent {
                name: format!("subreport #{index}"),
                reason: "no such sub-report".to_string(),
            })?;
    }
    Ok(report)
}

/// Builds a [`Report`] from a YAML report definition.
///
/// Errors that do not stop the walk are collected; a non-empty list at the end of a
/// document becomes one [`StatsError::ReportDefinition`]. Misses inside `optional`
/// blocks are logged and kept in [`warnings`](Self::warnings) instead.
#[derive(Debug)]
pub struct ReportDefParser<'a> {
    tree: &'a SimTree,
    registry: &'a HistogramFunctionRegistry,
    config: &'a StatsConfig,
    errors: Vec<String>,
    warnings: Vec<String>,
    next_uid: u32,
    include_depth: usize,
}

impl<'a> ReportDefParser<'a> {
    /// Creates a parser over a finalized tree.
    pub const fn new(
        tree: &'a SimTree,
        registry: &'a HistogramFunctionRegistry,
        config: &'a StatsConfig,
    ) -> Self {
        Self {
            tree,
            registry,
            config,
            errors: Vec::new(),
            warnings: Vec::new(),
            next_uid: 0,
            include_depth: 0,
        }
    }

    /// Warnings raised so far.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Sub-report identifiers consumed so far.
    pub const fn uids_used(&self) -> u32 {
        self.next_uid
    }

    /// Consumes a definition held in memory. Includes resolve against the working
    /// directory.
    pub fn parse_str(&mut self, text: &str, report: &mut Report) -> Result<()> {
        self.consume(text, Path::new("<string>"), PathBuf::from("."), report)
    }

    /// Consumes a definition file. Includes resolve against its directory first.
    pub fn parse_file(&mut self, path: &Path, report: &mut Report) -> Result<()> {
        let text = fs::read_to_string(path)?;
        let dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        self.consume(&text, path, dir, report)
    }

    fn consume(&mut self, text: &str, file: &Path, dir: PathBuf, report: &mut Report) -> Result<()> {
        self.errors.clear();
        let document: Value = serde_yaml::from_str(text)?;
        let scope = Scope::root(report.context(), dir);
        self.walk_document(&document, &scope, report)?;
        if !self.errors.is_empty() {
            return Err(StatsError::ReportDefinition {
                file: file.to_path_buf(),
                errors: std::mem::take(&mut self.errors),
            });
        }
        info!(
            file = %file.display(),
            report = %report.name(),
            stats = report.total_stats(),
            warnings = self.warnings.len(),
            "consumed report definition"
        );
        Ok(())
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn miss(&mut self, scope: &Scope, message: String) {
        if scope.optional {
            warn!(reason = %message, "optional report content not found");
            self.warnings.push(message);
        } else {
            self.errors.push(message);
        }
    }

    fn collect(&mut self, scope: &Scope, result: Result<()>) {
        match result {
            Ok(()) => {}
            Err(e @ StatsError::UnresolvedPath { .. }) => self.miss(scope, e.to_string()),
            Err(e) => self.errors.push(e.to_string()),
        }
    }

    fn take_uid(&mut self) -> Result<u32> {
        let limit = self.config.report_def.max_subreport_uids;
        if self.next_uid >= limit {
            return Err(StatsError::OutOfUid { limit });
        }
        self.next_uid += 1;
        Ok(self.next_uid)
    }

    fn walk_document(&mut self, document: &Value, scope: &Scope, report: &mut Report) -> Result<()> {
        match document {
            Value::Null => Ok(()),
            Value::Mapping(map) => self.walk_map(map, scope, report),
            _ => {
                self.error("top level of a report definition must be a map");
                Ok(())
            }
        }
    }

    fn walk_map(&mut self, map: &Mapping, scope: &Scope, report: &mut Report) -> Result<()> {
        for (key, value) in map {
            let Some(key) = scalar(key) else {
                self.error(format!("non-scalar key {key:?}"));
                continue;
            };
            self.walk_entry(&key, value, scope, report)?;
        }
        Ok(())
    }

    fn walk_block(&mut self, value: &Value, scope: &Scope, report: &mut Report) -> Result<()> {
        match value {
            Value::Null => Ok(()),
            Value::Mapping(map) => self.walk_map(map, scope, report),
            Value::Sequence(items) => {
                for item in items {
                    match item {
                        Value::Mapping(map) => self.walk_map(map, scope, report)?,
                        other => match scalar(other) {
                            Some(path) if scope.in_content => {
                                self.path_entry(&path, &Value::Null, scope, report)?;
                            }
                            _ => self.error(format!("unexpected sequence item {other:?}")),
                        },
                    }
                }
                Ok(())
            }
            other => {
                self.error(format!("expected a block, found {other:?}"));
                Ok(())
            }
        }
    }

    fn walk_entry(&mut self, key: &str, value: &Value, scope: &Scope, report: &mut Report) -> Result<()> {
        match key {
            "report_ignore" => {
                debug!("skipping report_ignore block");
                Ok(())
            }
            "include" => self.include(value, scope, report),
            "report" | "subreport" => self.begin_report(key, value, scope, report),
            "name" | "author" => {
                self.set_metadata(key, value, scope, report);
                Ok(())
            }
            "style" => {
                self.style(value, scope, report);
                Ok(())
            }
            "trigger" => {
                self.trigger(value, scope, report);
                Ok(())
            }
            "content" => {
                if !scope.in_report {
                    self.error("`content` outside a report");
                    return Ok(());
                }
                let mut inner = scope.clone();
                inner.in_content = true;
                self.walk_block(value, &inner, report)
            }
            "autopopulate" => {
                self.autopopulate(value, scope, report);
                Ok(())
            }
            "optional" => {
                let mut inner = scope.clone();
                inner.optional = true;
                self.walk_block(value, &inner, report)
            }
            k if k.ends_with(ARCH_CONTENT_SUFFIX) => {
                let arch = &k[..k.len() - ARCH_CONTENT_SUFFIX.len()];
                if !scope.in_report {
                    self.error(format!("`{k}` outside a report"));
                    return Ok(());
                }
                let honored = self.config.report_def.arch.as_deref() == Some(arch);
                if !honored {
                    debug!(arch, "dropping leaves of arch-specific content");
                }
                let mut inner = scope.clone();
                inner.in_content = true;
                inner.skip_leaves |= !honored;
                self.walk_block(value, &inner, report)
            }
            k if k.starts_with(HIST_DEF_PREFIX) => {
                self.hist_def(k, value, scope, report);
                Ok(())
            }
            _ => self.path_entry(key, value, scope, report),
        }
    }

    fn include(&mut self, value: &Value, scope: &Scope, report: &mut Report) -> Result<()> {
        let files: Vec<String> = match value {
            Value::Sequence(items) => items.iter().filter_map(scalar).collect(),
            other => scalar(other).into_iter().collect(),
        };
        if files.is_empty() {
            self.error("`include` expects a file name or a list of file names");
            return Ok(());
        }
        if self.include_depth >= MAX_INCLUDE_DEPTH {
            self.error(format!("includes nested deeper than {MAX_INCLUDE_DEPTH}"));
            return Ok(());
        }
        for file in files {
            let local = scope.dir.join(&file);
            let path = if local.exists() { local } else { PathBuf::from(&file) };
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    self.error(format!("cannot include `{file}`: {e}"));
                    continue;
                }
            };
            let document: Value = match serde_yaml::from_str(&text) {
                Ok(document) => document,
                Err(e) => {
                    self.error(format!("in include `{}`: {e}", path.display()));
                    continue;
                }
            };
            let mut inner = scope.clone();
            inner.content_include = scope.in_content || scope.content_include;
            inner.dir = path
                .parent()
                .map_or_else(|| scope.dir.clone(), Path::to_path_buf);
            debug!(file = %path.display(), "including report definition");
            self.include_depth += 1;
            let result = self.walk_document(&document, &inner, report);
            self.include_depth -= 1;
            result?;
        }
        Ok(())
    }

    fn begin_report(&mut self, key: &str, value: &Value, scope: &Scope, report: &mut Report) -> Result<()> {
        if key == "report" {
            if scope.content_include {
                self.error("`report` declared in a file included from content");
                return Ok(());
            }
            if scope.in_content {
                self.error("`report` is not allowed inside content; use `subreport`");
                return Ok(());
            }
            if scope.in_report {
                self.error("nested `report`; use `subreport`");
                return Ok(());
            }
            let mut inner = scope.clone();
            inner.in_report = true;
            return self.walk_block(value, &inner, report);
        }
        if !scope.in_report {
            self.error("`subreport` outside a report");
            return Ok(());
        }
        let mut targets = Vec::with_capacity(scope.targets.len());
        for target in &scope.targets {
            let uid = self.take_uid()?;
            let parent = match report_mut(report, &target.report) {
                Ok(parent) => parent,
                Err(e) => {
                    self.error(e.to_string());
                    continue;
                }
            };
            let index = parent.subreports().len();
            let name = self
                .tree
                .node(target.node)
                .map(|n| n.name().to_string())
                .unwrap_or_else(|_| format!("subreport_{uid}"));
            parent.add_subreport(name).set_context(target.node);
            let mut path = target.report.clone();
            path.push(index);
            targets.push(Target {
                node: target.node,
                captures: target.captures.clone(),
                report: path,
            });
        }
        let mut inner = scope.with_targets(targets);
        inner.in_content = false;
        self.walk_block(value, &inner, report)
    }

    fn set_metadata(&mut self, key: &str, value: &Value, scope: &Scope, report: &mut Report) {
        if !scope.in_report {
            self.error(format!("`{key}` outside a report"));
            return;
        }
        let Some(template) = scalar(value) else {
            self.error(format!("`{key}` expects a string"));
            return;
        };
        for target in &scope.targets {
            let location = self.tree.location(target.node);
            let text = match substitute(&template, &location, &target.captures) {
                Ok(text) => text,
                Err(e) => {
                    self.error(e.to_string());
                    continue;
                }
            };
            if key == "author" {
                match report_mut(report, &target.report) {
                    Ok(r) => r.set_author(text),
                    Err(e) => self.error(e.to_string()),
                }
                continue;
            }
            if let Some((last, parent_path)) = target.report.split_last() {
                let duplicate = report_mut(report, parent_path).is_ok_and(|parent| {
                    parent
                        .subreports()
                        .iter()
                        .enumerate()
                        .any(|(i, r)| i != *last && r.name() == text)
                });
                if duplicate {
                    self.error(format!("duplicate report name `{text}`"));
                    continue;
                }
            }
            match report_mut(report, &target.report) {
                Ok(r) => r.set_name(text),
                Err(e) => self.error(e.to_string()),
            }
        }
    }

    fn style(&mut self, value: &Value, scope: &Scope, report: &mut Report) {
        if !scope.in_report {
            self.error("`style` outside a report");
            return;
        }
        let Value::Mapping(map) = value else {
            self.error("`style` expects a map");
            return;
        };
        for (k, v) in map {
            let (Some(k), Some(v)) = (scalar(k), scalar(v)) else {
                self.error(format!("style entries must be scalars, found {k:?}: {v:?}"));
                continue;
            };
            for target in &scope.targets {
                match report_mut(report, &target.report) {
                    Ok(r) => r.set_style(k.clone(), v.clone()),
                    Err(e) => self.error(e.to_string()),
                }
            }
        }
    }

    fn trigger(&mut self, value: &Value, scope: &Scope, report: &mut Report) {
        if !scope.in_report {
            self.error(StatsError::Trigger("`trigger` outside a report".to_string()).to_string());
            return;
        }
        let Value::Mapping(map) = value else {
            self.error(StatsError::Trigger("`trigger` expects a map".to_string()).to_string());
            return;
        };
        let tag = map.get("tag").and_then(scalar);
        for (k, v) in map {
            let key = scalar(k).unwrap_or_default();
            let role = match key.as_str() {
                "start" => TriggerRole::Start,
                "stop" => TriggerRole::Stop,
                "tag" => continue,
                "trigger" => {
                    self.error(StatsError::Trigger("nested `trigger` block".to_string()).to_string());
                    continue;
                }
                other => {
                    self.error(StatsError::Trigger(format!("unknown trigger key `{other}`")).to_string());
                    continue;
                }
            };
            let Some(source) = scalar(v) else {
                self.error(StatsError::Trigger(format!("`{key}` expects an expression")).to_string());
                continue;
            };
            for target in &scope.targets {
                let built = Trigger::new(self.tree, target.node, &source, role, &self.config.trigger)
                    .map(|t| match &tag {
                        Some(tag) => t.with_tag(tag.clone()),
                        None => t,
                    });
                let trigger = match built {
                    Ok(trigger) => trigger,
                    Err(e) => {
                        self.error(e.to_string());
                        continue;
                    }
                };
                match report_mut(report, &target.report) {
                    Ok(r) if role == TriggerRole::Start => r.set_start_trigger(trigger),
                    Ok(r) => r.set_stop_trigger(trigger),
                    Err(e) => self.error(e.to_string()),
                }
            }
        }
    }

    fn autopopulate(&mut self, value: &Value, scope: &Scope, report: &mut Report) {
        if !scope.in_content {
            self.error("`autopopulate` outside content");
            return;
        }
        let mut filter = String::new();
        let mut max_recursion = None;
        let mut max_report_depth = None;
        match value {
            Value::Mapping(map) => {
                for (k, v) in map {
                    match scalar(k).as_deref() {
                        Some("attributes") => filter = scalar(v).unwrap_or_default(),
                        Some("max_recursion_depth") => {
                            max_recursion = v.as_u64().and_then(|n| usize::try_from(n).ok());
                        }
                        Some("max_report_depth") => {
                            max_report_depth = v.as_u64().and_then(|n| usize::try_from(n).ok());
                        }
                        _ => self.error(format!("unknown autopopulate key {k:?}")),
                    }
                }
            }
            Value::Null => {}
            other => filter = scalar(other).unwrap_or_default(),
        }
        if scope.skip_leaves {
            return;
        }
        for target in &scope.targets {
            let result = report_mut(report, &target.report).and_then(|r| {
                r.autopopulate(
                    self.tree,
                    target.node,
                    &filter,
                    &target.captures,
                    max_recursion,
                    max_report_depth,
                )
                .map(|_| ())
            });
            self.collect(scope, result);
        }
    }

    fn hist_def(&mut self, key: &str, value: &Value, scope: &Scope, report: &mut Report) {
        if !scope.in_content {
            self.error(format!("`{key}` outside content"));
            return;
        }
        let Some((path, function_name)) = key[HIST_DEF_PREFIX.len()..].rsplit_once('.') else {
            self.error(format!("`{key}` must name a histogram and a function"));
            return;
        };
        let template = scalar(value);
        for target in &scope.targets {
            let matches = match self.tree.find_matches(target.node, path) {
                Ok(matches) => matches,
                Err(e) => {
                    self.error(e.to_string());
                    continue;
                }
            };
            if matches.is_empty() {
                let context = self.tree.location(target.node);
                self.miss(scope, StatsError::unresolved(path, context).to_string());
                continue;
            }
            for m in matches {
                let kind = match self.tree.histogram(m.node) {
                    Ok(h) => h.kind(),
                    Err(e) => {
                        self.error(e.to_string());
                        continue;
                    }
                };
                let function = match self.registry.lookup(function_name, kind) {
                    Ok(f) => f,
                    Err(e) => {
                        self.error(e.to_string());
                        continue;
                    }
                };
                if scope.skip_leaves {
                    continue;
                }
                let location = self.tree.location(m.node);
                let mut captures = target.captures.clone();
                captures.extend(m.captures);
                let name = match &template {
                    Some(t) => substitute(t, &location, &captures),
                    None => Ok(format!(
                        "{}_{function_name}",
                        self.tree.node(m.node).map(|n| n.name()).unwrap_or(path)
                    )),
                };
                let expression = Expression::Histogram(HistogramCall {
                    node: m.node,
                    label: path.to_string(),
                    function_name: function_name.to_string(),
                    function,
                });
                let result = name.and_then(|name| {
                    report_mut(report, &target.report)?.add_expression(
                        self.tree,
                        expression,
                        &name,
                        SnapshotMode::Absolute,
                    )
                });
                self.collect(scope, result);
            }
        }
    }

    fn path_entry(&mut self, key: &str, value: &Value, scope: &Scope, report: &mut Report) -> Result<()> {
        let is_block = matches!(value, Value::Mapping(_) | Value::Sequence(_));
        if !is_block && !scope.in_content {
            self.error(format!("unexpected key `{key}` outside content"));
            return Ok(());
        }
        let template = if is_block {
            String::new()
        } else {
            match value {
                Value::Null => String::new(),
                other => match scalar(other) {
                    Some(s) => s,
                    None => {
                        self.error(format!("statistic name for `{key}` must be a string"));
                        return Ok(());
                    }
                },
            }
        };
        let mut next = Vec::new();
        for target in &scope.targets {
            let matches = match self.tree.find_matches(target.node, key) {
                Ok(matches) => matches,
                Err(e) => {
                    self.error(e.to_string());
                    continue;
                }
            };
            if matches.is_empty() {
                let expression = if is_block { None } else { Expression::parse(key).ok() };
                match expression {
                    Some(_) if scope.skip_leaves => {}
                    Some(expression) => {
                        let result = self.add_expression_leaf(expression, &template, target, report);
                        self.collect(scope, result);
                    }
                    None => {
                        let context = self.tree.location(target.node);
                        self.miss(scope, StatsError::unresolved(key, context).to_string());
                    }
                }
                continue;
            }
            for m in matches {
                let mut captures = target.captures.clone();
                captures.extend(m.captures);
                if is_block {
                    next.push(Target {
                        node: m.node,
                        captures,
                        report: target.report.clone(),
                    });
                    continue;
                }
                if scope.skip_leaves {
                    continue;
                }
                let location = self.tree.location(m.node);
                let result = substitute(&template, &location, &captures).and_then(|name| {
                    report_mut(report, &target.report)?.add(self.tree, m.node, &name)
                });
                self.collect(scope, result);
            }
        }
        if is_block && !next.is_empty() {
            let inner = scope.with_targets(next);
            self.walk_block(value, &inner, report)?;
        }
        Ok(())
    }

    fn add_expression_leaf(
        &self,
        expression: Expression,
        template: &str,
        target: &Target,
        report: &mut Report,
    ) -> Result<()> {
        let location = self.tree.location(target.node);
        let name = substitute(template, &location, &target.captures)?;
        let expression = expression.resolve(self.tree, target.node)?;
        report_mut(report, &target.report)?.add_expression(
            self.tree,
            expression,
            &name,
            SnapshotMode::Difference,
        )
    }
}
