// ============================================================
// Layer 5 — Global Gradient Norm Clipping
// ============================================================
// Burn's built-in gradient clipping works per parameter
// tensor. Training here needs the GLOBAL L2 norm over every
// trainable tensor in the model:
//
//   global_norm = sqrt( Σ_p ||∇p||² )
//   scale       = min(1, max_norm / global_norm)
//
// Both passes walk the module with a `ModuleVisitor` and look
// each parameter up in the `GradientsParams` by its id.
// Clipping rewrites the gradients themselves; the learning
// rate handed to the optimizer is left alone.

use burn::{
    module::{AutodiffModule, ModuleVisitor, Param, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

// ─── Visitors ─────────────────────────────────────────────────────────────────
/// Sums ||∇p||² over every float parameter that has a gradient.
struct GradSquaredSum<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    total: f64,
    _backend: std::marker::PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradSquaredSum<'_, B> {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(param.id) {
            self.total += (grad.clone() * grad).sum().into_scalar().elem::<f64>();
        }
    }
}

/// Multiplies every registered gradient by `scale`.
struct GradScaler<'a, B: AutodiffBackend> {
    grads: &'a mut GradientsParams,
    scale: f64,
    _backend: std::marker::PhantomData<B>,
}

impl<B: AutodiffBackend> GradScaler<'_, B> {
    fn rescale<const D: usize>(&mut self, id: ParamId) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register::<B::InnerBackend, D>(id, grad.mul_scalar(self.scale));
        }
    }
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradScaler<'_, B> {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        self.rescale::<D>(param.id);
    }
}

// ─── Public API ───────────────────────────────────────────────────────────────
/// sqrt(Σ ||∇p||²) over every parameter of `module`.
pub fn global_grad_norm<B, M>(module: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = GradSquaredSum::<B> { grads, total: 0.0, _backend: Default::default() };
    module.visit(&mut visitor);
    visitor.total.sqrt()
}

/// Multiply the gradient of every parameter of `module` by `scale`.
pub fn scale_gradients<B, M>(module: &M, grads: &mut GradientsParams, scale: f64)
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = GradScaler::<B> { grads, scale, _backend: Default::default() };
    module.visit(&mut visitor);
}

/// Factor that brings `norm` down to at most `max_norm`.
pub fn clip_scale(norm: f64, max_norm: f64) -> f64 {
    if norm > max_norm && norm > 0.0 {
        max_norm / norm
    } else {
        1.0
    }
}

/// Every parameter value of `module`, concatenated in visit order.
#[cfg(test)]
pub fn flat_values<B: Backend, M: Module<B>>(module: &M) -> Vec<f32> {
    struct Collect(Vec<f32>);

    impl<B: Backend> ModuleVisitor<B> for Collect {
        fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
            self.0.extend(param.val().to_data().iter::<f32>());
        }
    }

    let mut visitor = Collect(Vec::new());
    module.visit(&mut visitor);
    visitor.0
}
