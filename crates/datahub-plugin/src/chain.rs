//! Chain registry: resolves an operation name to an immutable call chain.
//!
//! Both the action namespace and the authorization namespace are built on
//! [`ChainRegistry`]. Each namespace stores contributions per operation
//! name and turns them into a [`ChainPlan`]:
//!
//! - the terminal is the winning [`Callable::Replacement`] according to the
//!   namespace [`Precedence`], or the built-in default when no plugin
//!   replaces the operation;
//! - every [`Callable::ChainLink`] wraps the rest of the chain, in ascending
//!   load order, so the first loaded link is outermost.
//!
//! Plans are computed on first use and cached until the registry is mutated.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use datahub_core::config::Precedence;
use datahub_core::{AppError, AppResult};

/// How a contribution participates in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionForm {
    /// Replaces the terminal implementation.
    Replacement,
    /// Wraps the remainder of the chain.
    ChainLink,
}

/// A terminal callable `T` or a wrapping callable `L`.
#[derive(Debug)]
pub enum Callable<T: ?Sized, L: ?Sized> {
    /// A terminal implementation.
    Replacement(Arc<T>),
    /// A wrapper receiving the rest of the chain.
    ChainLink(Arc<L>),
}

impl<T: ?Sized, L: ?Sized> Callable<T, L> {
    /// Returns the declared form of this callable.
    pub fn form(&self) -> ContributionForm {
        match self {
            Self::Replacement(_) => ContributionForm::Replacement,
            Self::ChainLink(_) => ContributionForm::ChainLink,
        }
    }
}

impl<T: ?Sized, L: ?Sized> Clone for Callable<T, L> {
    fn clone(&self) -> Self {
        match self {
            Self::Replacement(t) => Self::Replacement(Arc::clone(t)),
            Self::ChainLink(l) => Self::ChainLink(Arc::clone(l)),
        }
    }
}

/// A contribution stored for one operation name.
#[derive(Debug)]
struct ChainEntry<T: ?Sized, L: ?Sized> {
    plugin: String,
    load_order: u32,
    callable: Callable<T, L>,
}

/// One wrapping link of a resolved plan.
#[derive(Debug)]
pub struct PlannedLink<L: ?Sized> {
    /// Plugin that contributed the link.
    pub plugin: String,
    /// Load order of that plugin.
    pub load_order: u32,
    /// The link implementation.
    pub handler: Arc<L>,
}

/// Where the terminal of a plan comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalSource {
    /// A plugin Replacement.
    Plugin {
        /// Plugin name.
        name: String,
        /// Plugin load order.
        load_order: u32,
    },
    /// The built-in default implementation.
    Builtin,
}

/// The innermost callable of a resolved plan.
#[derive(Debug)]
pub struct Terminal<T: ?Sized> {
    /// Origin of the terminal.
    pub source: TerminalSource,
    /// The terminal implementation.
    pub handler: Arc<T>,
}

/// Resolved, immutable call sequence for one operation name.
#[derive(Debug)]
pub struct ChainPlan<T: ?Sized, L: ?Sized> {
    name: String,
    links: Vec<PlannedLink<L>>,
    terminal: Terminal<T>,
}

impl<T: ?Sized, L: ?Sized> ChainPlan<T, L> {
    /// Operation name this plan serves.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wrapping links, outermost first.
    pub fn links(&self) -> &[PlannedLink<L>] {
        &self.links
    }

    /// The terminal implementation.
    pub fn terminal(&self) -> &Terminal<T> {
        &self.terminal
    }

    /// Number of callables in the plan, terminal included.
    pub fn len(&self) -> usize {
        self.links.len() + 1
    }

    /// A plan always holds a terminal.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Names of the contributing plugins from outermost to terminal, with
    /// `"builtin"` standing for the default implementation.
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self.links.iter().map(|l| l.plugin.clone()).collect();
        sources.push(match &self.terminal.source {
            TerminalSource::Plugin { name, .. } => name.clone(),
            TerminalSource::Builtin => "builtin".to_string(),
        });
        sources
    }
}

/// Contributions for one namespace plus the cached plans built from them.
#[derive(Debug)]
pub struct ChainRegistry<T: ?Sized, L: ?Sized> {
    /// Namespace label used in errors and log events.
    namespace: &'static str,
    /// Which Replacement wins.
    precedence: Precedence,
    /// Operation name → contributions sorted by load order.
    entries: HashMap<String, Vec<ChainEntry<T, L>>>,
    /// Operation name → built-in default.
    defaults: HashMap<String, Arc<T>>,
    /// Operation name → cached plan.
    plans: DashMap<String, Arc<ChainPlan<T, L>>>,
}

impl<T: ?Sized, L: ?Sized> ChainRegistry<T, L> {
    /// Creates an empty namespace.
    pub fn new(namespace: &'static str, precedence: Precedence) -> Self {
        Self {
            namespace,
            precedence,
            entries: HashMap::new(),
            defaults: HashMap::new(),
            plans: DashMap::new(),
        }
    }

    /// Namespace label.
    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// Replacement precedence of this namespace.
    pub fn precedence(&self) -> Precedence {
        self.precedence
    }

    /// Registers a plugin contribution for `name`.
    pub fn register(&mut self, plugin: &str, load_order: u32, name: &str, callable: Callable<T, L>) {
        debug!(
            namespace = self.namespace,
            operation = %name,
            plugin_id = %plugin,
            load_order,
            form = ?callable.form(),
            "Contribution registered"
        );

        let entries = self.entries.entry(name.to_string()).or_default();
        entries.push(ChainEntry {
            plugin: plugin.to_string(),
            load_order,
            callable,
        });
        // Stable, so contributions of one plugin keep registration order.
        entries.sort_by_key(|e| e.load_order);

        self.plans.clear();
    }

    /// Registers the built-in default for `name`, replacing any previous one.
    pub fn register_default(&mut self, name: &str, handler: Arc<T>) {
        self.defaults.insert(name.to_string(), handler);
        self.plans.clear();
    }

    /// Returns whether `name` resolves to a terminal.
    pub fn contains(&self, name: &str) -> bool {
        self.defaults.contains_key(name)
            || self.entries.get(name).is_some_and(|entries| {
                entries
                    .iter()
                    .any(|e| e.callable.form() == ContributionForm::Replacement)
            })
    }

    /// All operation names that resolve to a terminal, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .defaults
            .keys()
            .chain(self.entries.keys())
            .filter(|name| self.contains(name))
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Resolves `name` to its plan, building and caching it on first use.
    pub fn resolve(&self, name: &str) -> AppResult<Arc<ChainPlan<T, L>>> {
        if let Some(plan) = self.plans.get(name) {
            return Ok(Arc::clone(plan.value()));
        }

        let plan = Arc::new(self.build_plan(name)?);
        let cached = self
            .plans
            .entry(name.to_string())
            .or_insert(plan)
            .value()
            .clone();
        Ok(cached)
    }

    fn build_plan(&self, name: &str) -> AppResult<ChainPlan<T, L>> {
        let entries = self.entries.get(name).map(Vec::as_slice).unwrap_or(&[]);

        let replacements: Vec<(&ChainEntry<T, L>, &Arc<T>)> = entries
            .iter()
            .filter_map(|e| match &e.callable {
                Callable::Replacement(handler) => Some((e, handler)),
                Callable::ChainLink(_) => None,
            })
            .collect();

        let winner = match self.precedence {
            Precedence::LastWins => replacements.last(),
            Precedence::FirstWins => replacements.first(),
        };

        let terminal = match winner {
            Some(&(entry, handler)) => {
                if replacements.len() > 1 {
                    let shadowed: Vec<&str> = replacements
                        .iter()
                        .filter(|(e, _)| !std::ptr::eq(*e, entry))
                        .map(|(e, _)| e.plugin.as_str())
                        .collect();
                    warn!(
                        namespace = self.namespace,
                        operation = %name,
                        winner = %entry.plugin,
                        shadowed = ?shadowed,
                        precedence = ?self.precedence,
                        "Multiple replacements registered, using one"
                    );
                }
                Terminal {
                    source: TerminalSource::Plugin {
                        name: entry.plugin.clone(),
                        load_order: entry.load_order,
                    },
                    handler: Arc::clone(handler),
                }
            }
            None => match self.defaults.get(name) {
                Some(handler) => Terminal {
                    source: TerminalSource::Builtin,
                    handler: Arc::clone(handler),
                },
                None => return Err(AppError::unknown_operation(self.namespace, name)),
            },
        };

        let links: Vec<PlannedLink<L>> = entries
            .iter()
            .filter_map(|e| match &e.callable {
                Callable::ChainLink(handler) => Some(PlannedLink {
                    plugin: e.plugin.clone(),
                    load_order: e.load_order,
                    handler: Arc::clone(handler),
                }),
                Callable::Replacement(_) => None,
            })
            .collect();

        let plan = ChainPlan {
            name: name.to_string(),
            links,
            terminal,
        };

        debug!(
            namespace = self.namespace,
            operation = %name,
            chain = ?plan.sources(),
            "Chain plan resolved"
        );

        Ok(plan)
    }
}
