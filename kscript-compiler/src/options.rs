// kscript-compiler - Compiler options for kerboscript
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Compiler configuration and the host lookups it consults.

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashSet;

/// Answers whether a name is a built-in function.
pub trait FunctionLookup {
    fn exists(&self, name: &str) -> bool;
}

/// Answers whether a name is a variable bound by the host.
pub trait BindingLookup {
    fn has_binding(&self, name: &str) -> bool;
}

/// A case-insensitive name set usable as either lookup.
#[derive(Debug, Clone, Default)]
pub struct BuiltinNames {
    names: FxHashSet<String>,
}

impl BuiltinNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        BuiltinNames {
            names: names
                .into_iter()
                .map(|n| n.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The standard kOS built-in functions.
    pub fn standard_functions() -> Self {
        BuiltinNames::new(STANDARD_FUNCTIONS)
    }

    /// The standard kOS bound variables.
    pub fn standard_bindings() -> Self {
        BuiltinNames::new(STANDARD_BINDINGS)
    }
}

impl FunctionLookup for BuiltinNames {
    fn exists(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl BindingLookup for BuiltinNames {
    fn has_binding(&self, name: &str) -> bool {
        self.contains(name)
    }
}

const STANDARD_FUNCTIONS: &[&str] = &[
    "abs", "add", "addalarm", "allwaypoints", "angleaxis", "anglediff", "arccos", "arcsin",
    "arctan", "arctan2", "body", "bodyatmosphere", "career", "cd", "ceiling", "char",
    "clearscreen", "constant", "copy", "copypath", "cos", "create", "createdir", "debugdump",
    "delete", "deletealarm", "deletepath", "edit", "exists", "floor", "heading", "highlight",
    "hsv", "hsva", "hudtext", "latlng", "lex", "list", "listalarms", "ln", "log10", "logfile",
    "lookdirup", "max", "min", "mod", "movepath", "node", "open", "orbitat", "positionat",
    "print", "printat", "printlist", "profileresult", "q", "queue", "r", "random", "range",
    "readjson", "reboot", "remove", "rename", "rgb", "rgba", "rotatefromto", "round", "run",
    "scriptpath", "shutdown", "sin", "sqrt", "stack", "stage", "switch", "tan",
    "toggleflybywire", "transfer", "transferall", "unchar", "uniqueset", "v", "vang", "vcrs",
    "vdot", "vecdraw", "velocityat", "vessel", "vxcl", "waypoint", "writejson",
];

const STANDARD_BINDINGS: &[&str] = &[
    "abort", "altitude", "apoapsis", "body", "brakes", "config", "core", "encounter", "eta",
    "facing", "gear", "heading", "kuniverse", "lights", "mass", "maxthrust", "missiontime",
    "north", "periapsis", "prograde", "rcs", "retrograde", "sas", "sessiontime", "ship",
    "stage", "status", "steering", "target", "terminal", "throttle", "time", "up", "velocity",
    "version", "wheelsteering", "wheelthrottle",
];

/// Options controlling one compile.
#[derive(Clone, Default)]
pub struct CompilerOptions {
    /// RUN loads subprograms into the caller's address space.
    pub load_programs_in_same_address_space: bool,
    pub func_manager: Option<Rc<dyn FunctionLookup>>,
    pub bind_manager: Option<Rc<dyn BindingLookup>>,
    /// Allow user declarations to shadow built-in names.
    pub allow_clobber_builtins: bool,
    /// The script is compiled as the body of a RUN.
    pub is_called_from_run: bool,
}

impl CompilerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn same_address_space(mut self, enabled: bool) -> Self {
        self.load_programs_in_same_address_space = enabled;
        self
    }

    pub fn with_functions(mut self, lookup: Rc<dyn FunctionLookup>) -> Self {
        self.func_manager = Some(lookup);
        self
    }

    pub fn with_bindings(mut self, lookup: Rc<dyn BindingLookup>) -> Self {
        self.bind_manager = Some(lookup);
        self
    }

    pub fn allow_clobber(mut self, enabled: bool) -> Self {
        self.allow_clobber_builtins = enabled;
        self
    }

    pub fn called_from_run(mut self, enabled: bool) -> Self {
        self.is_called_from_run = enabled;
        self
    }

    /// Options with the standard built-in functions and bindings.
    pub fn standard() -> Self {
        Self::new()
            .with_functions(Rc::new(BuiltinNames::standard_functions()))
            .with_bindings(Rc::new(BuiltinNames::standard_bindings()))
    }

    pub(crate) fn is_builtin_function(&self, name: &str) -> bool {
        self.func_manager
            .as_ref()
            .is_some_and(|lookup| lookup.exists(name))
    }

    pub(crate) fn is_bound_variable(&self, name: &str) -> bool {
        self.bind_manager
            .as_ref()
            .is_some_and(|lookup| lookup.has_binding(name))
    }
}

impl fmt::Debug for CompilerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerOptions")
            .field(
                "load_programs_in_same_address_space",
                &self.load_programs_in_same_address_space,
            )
            .field("func_manager", &self.func_manager.is_some())
            .field("bind_manager", &self.bind_manager.is_some())
            .field("allow_clobber_builtins", &self.allow_clobber_builtins)
            .field("is_called_from_run", &self.is_called_from_run)
            .finish()
    }
}
