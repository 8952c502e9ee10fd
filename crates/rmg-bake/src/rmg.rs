use std::time::Duration;

use thiserror::Error;

use crate::{
    Backend, BackendError, Bake, BakeError, BakeOptions, ConfigurationError, Declaration,
    declare::{DenseIds, PassKey},
};

///Top level Error structure.
#[derive(Debug, Error)]
pub enum RmgError {
    #[error("Bake error")]
    Bake(#[from] BakeError),

    #[error("Backend error")]
    Backend(#[from] BackendError),

    #[error("Declaration error")]
    Configuration(#[from] ConfigurationError),
}

///Main RMG interface. Owns the declaration, the last successful bake and the backend executing it.
pub struct Rmg<B: Backend> {
    declaration: Declaration,
    options: BakeOptions,
    backend: B,
    baked: Option<Bake>,
    ///Key to id mapping of the stream `baked` was built from.
    ids: Option<DenseIds>,
}

impl<B: Backend> Rmg<B> {
    pub fn new(backend: B) -> Self {
        Self::with_options(backend, BakeOptions::default())
    }

    pub fn with_options(backend: B, options: BakeOptions) -> Self {
        Rmg {
            declaration: Declaration::new(),
            options,
            backend,
            baked: None,
            ids: None,
        }
    }

    pub fn declaration(&self) -> &Declaration {
        &self.declaration
    }

    ///Mutable access to the declaration. Any change marks the graph for re-baking.
    pub fn declare(&mut self) -> &mut Declaration {
        &mut self.declaration
    }

    pub fn options(&self) -> &BakeOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: BakeOptions) {
        if options != self.options {
            self.options = options;
            //forces a re-bake
            self.baked = None;
        }
    }

    ///Bakes the declaration if it changed since the last successful bake. On failure the previous bake is discarded as
    /// well, so a failed declaration is never executed.
    pub fn bake(&mut self) -> Result<&Bake, RmgError> {
        if self.declaration.is_dirty() || self.baked.is_none() {
            self.baked = None;
            self.ids = None;

            let encoded = self.declaration.encode()?;
            let bake = crate::bake(&encoded.bytes, &self.options)?;
            self.backend.create(&bake.graph.encode())?;
            self.backend.bake(&bake.graph)?;

            self.ids = Some(encoded.ids);
            self.baked = Some(bake);
            self.declaration.mark_clean();
        } else {
            #[cfg(feature = "logging")]
            log::trace!("Declaration unchanged, reusing baked graph");
        }

        self.baked.as_ref().ok_or(RmgError::Backend(BackendError::NotBaked))
    }

    ///Bakes if needed, then submits the graph once.
    pub fn run(&mut self) -> Result<(), RmgError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        self.bake()?;
        self.backend.submit()?;
        Ok(())
    }

    ///The last successful bake, if it is still valid.
    pub fn baked(&self) -> Option<&Bake> {
        self.baked.as_ref()
    }

    ///Time `pass` took on the last run.
    pub fn pass_time(&self, pass: PassKey) -> Option<Duration> {
        let id = self.ids.as_ref()?.pass(pass)?;
        self.backend.query_time(id)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
