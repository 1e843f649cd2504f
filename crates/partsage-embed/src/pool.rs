//! Sentence pooling over encoder output.
use anyhow::{bail, Result};
use candle_core::{DType, Tensor};

/// Pools `[B, T, H]` token states into `[B, H]` unit vectors, averaging only
/// positions where `attention_mask` (`[B, T]`) is set.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, tokens, width) = match hidden.dims() {
        &[b, t, h] => (b, t, h),
        other => bail!("encoder output must be [batch, tokens, hidden], got {other:?}"),
    };
    if attention_mask.dims() != [batch, tokens] {
        bail!("attention mask {:?} does not match encoder output [{batch}, {tokens}]", attention_mask.dims());
    }
    let pooled = l2_normalize(&mean_pool(hidden, attention_mask)?)?;
    if pooled.dims() != [batch, width] {
        bail!("pooled output {:?} is not [{batch}, {width}]", pooled.dims());
    }
    Ok(pooled)
}

fn mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let weights = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let summed = hidden.broadcast_mul(&weights.unsqueeze(2)?)?.sum(1)?;
    // all-padding rows would divide by zero
    let counts = weights.sum_keepdim(1)?.clamp(1.0, f64::MAX)?;
    Ok(summed.broadcast_div(&counts)?)
}

fn l2_normalize(rows: &Tensor) -> Result<Tensor> {
    let floor = if rows.dtype() == DType::F16 { 1e-6 } else { 1e-12 };
    let norms = rows.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(floor, f64::MAX)?;
    Ok(rows.broadcast_div(&norms)?)
}
