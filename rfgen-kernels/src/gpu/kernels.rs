/// CUDA source compiled at runtime with NVRTC, plus the entry points it exports.
pub struct CudaKernel {
    pub src: &'static str,
    pub funcs: &'static [&'static str],
}

/// Width of the shared-memory tile. Transforms up to this width run entirely
/// in shared memory; wider ones stage tiles through it and finish the wide
/// strides in a global scratch row.
pub const MAX_LOCAL_WIDTH: usize = 2048;

/// Threads per block. One block processes one sample.
pub const BLOCK_THREADS: u32 = 256;

pub const KERNEL: CudaKernel = CudaKernel {
    src: r#"
#define MAX_LOCAL_WIDTH 2048
#define NEG_INF __longlong_as_double((long long)0xfff0000000000000ULL)

template <typename T>
__device__ __forceinline__ void butterflyStage(T *row, int h, int width)
{
    for (int k = threadIdx.x; k < (width >> 1); k += blockDim.x)
    {
        int i = (k / h) * (h << 1) + (k % h);
        T a = row[i];
        T b = row[i + h];
        row[i] = a + b;
        row[i + h] = a - b;
    }
    __syncthreads();
}

// Rows that fit in shared memory are transformed in place there. Wider rows
// live in global scratch: every MAX_LOCAL_WIDTH tile runs its narrow strides
// in shared memory, then the wide strides sweep the global row.
template <typename T>
__device__ void twoTierFht(T *row, T *tile, int width)
{
    if (width <= MAX_LOCAL_WIDTH)
    {
        for (int h = 1; h < width; h <<= 1)
            butterflyStage(row, h, width);
        return;
    }
    for (int start = 0; start < width; start += MAX_LOCAL_WIDTH)
    {
        for (int j = threadIdx.x; j < MAX_LOCAL_WIDTH; j += blockDim.x)
            tile[j] = row[start + j];
        __syncthreads();
        for (int h = 1; h < MAX_LOCAL_WIDTH; h <<= 1)
            butterflyStage(tile, h, MAX_LOCAL_WIDTH);
        for (int j = threadIdx.x; j < MAX_LOCAL_WIDTH; j += blockDim.x)
            row[start + j] = tile[j];
        __syncthreads();
    }
    for (int h = MAX_LOCAL_WIDTH; h < width; h <<= 1)
        butterflyStage(row, h, width);
}

template <typename T>
__device__ __forceinline__ T *workRow(T *tile, T *scratch, int width)
{
    return width <= MAX_LOCAL_WIDTH ? tile : scratch + (size_t)blockIdx.x * width;
}

template <typename T>
__device__ void sorfInPlace(T *row, T *tile, const signed char *radem, int rademRowLen,
                            int layerStart, int repeat, int width, T norm)
{
    for (int layer = 0; layer < 3; layer++)
    {
        const signed char *signs = radem + (size_t)(layerStart + layer) * rademRowLen + (size_t)repeat * width;
        for (int j = threadIdx.x; j < width; j += blockDim.x)
            row[j] *= (T)signs[j] * norm;
        __syncthreads();
        twoTierFht(row, tile, width);
    }
}

template <typename T>
__device__ void loadRow(T *row, const T *src, int width)
{
    for (int j = threadIdx.x; j < width; j += blockDim.x)
        row[j] = src[j];
    __syncthreads();
}

template <typename T>
__device__ void loadWindow(T *row, const T *sample, int position, int dim, int windowLen, int width)
{
    for (int j = threadIdx.x; j < width; j += blockDim.x)
        row[j] = j < windowLen ? sample[position * dim + j] : (T)0;
    __syncthreads();
}

__device__ __forceinline__ double rectifiedPower(double value, int order)
{
    if (value <= 0.0)
        return 0.0;
    if (order == 0)
        return 1.0;
    return order == 1 ? value : value * value;
}

__device__ __forceinline__ double averagingFactor(int averaging, int windows)
{
    if (averaging == 1)
        return 1.0 / sqrt((double)windows);
    if (averaging == 2)
        return 1.0 / (double)windows;
    return 1.0;
}

template <typename T>
__device__ __forceinline__ T *sharedTile()
{
    extern __shared__ __align__(8) unsigned char sharedBytes[];
    return reinterpret_cast<T *>(sharedBytes);
}

template <typename T>
__device__ void rbfFeatures(const T *x, const signed char *radem, const T *chi, double *out,
                            double *grad, T *scratch, int width, int rademRowLen, int numFreqs,
                            double sigma, double scale, T norm, int withGrad)
{
    T *tile = sharedTile<T>();
    T *row = workRow(tile, scratch, width);
    const T *sample = x + (size_t)blockIdx.x * width;
    double *outRow = out + (size_t)blockIdx.x * 2 * numFreqs;
    double *gradRow = grad + (size_t)blockIdx.x * 2 * numFreqs;
    int numRepeats = (numFreqs + width - 1) / width;

    for (int repeat = 0; repeat < numRepeats; repeat++)
    {
        loadRow(row, sample, width);
        sorfInPlace(row, tile, radem, rademRowLen, 0, repeat, width, norm);
        int first = repeat * width;
        int active = min(width, numFreqs - first);
        for (int j = threadIdx.x; j < active; j += blockDim.x)
        {
            int f = first + j;
            double projected = (double)row[j] * (double)chi[f];
            double s, c;
            sincos(sigma * projected, &s, &c);
            outRow[2 * f] = c * scale;
            outRow[2 * f + 1] = s * scale;
            if (withGrad)
            {
                gradRow[2 * f] = (-projected * s) * scale;
                gradRow[2 * f + 1] = (projected * c) * scale;
            }
        }
        __syncthreads();
    }
}

template <typename T>
__device__ void arccosFeatures(const T *x, const signed char *radem, const T *chi, double *out,
                               T *scratch, int width, int rademRowLen, int numFreqs,
                               int kernelOrder, double scale, T norm)
{
    T *tile = sharedTile<T>();
    T *row = workRow(tile, scratch, width);
    const T *sample = x + (size_t)blockIdx.x * width;
    double *outRow = out + (size_t)blockIdx.x * numFreqs;
    int numRepeats = (numFreqs + width - 1) / width;

    for (int repeat = 0; repeat < numRepeats; repeat++)
    {
        loadRow(row, sample, width);
        sorfInPlace(row, tile, radem, rademRowLen, 0, repeat, width, norm);
        int first = repeat * width;
        int active = min(width, numFreqs - first);
        for (int j = threadIdx.x; j < active; j += blockDim.x)
        {
            int f = first + j;
            outRow[f] = rectifiedPower((double)row[j] * (double)chi[f], kernelOrder) * scale;
        }
        __syncthreads();
    }
}

template <typename T>
__device__ void polyFeatures(const T *x, const signed char *radem, const T *chi, double *out,
                             T *scratch, int width, int rademRowLen, int numFreqs, int degree,
                             double scale, T norm)
{
    T *tile = sharedTile<T>();
    T *row = workRow(tile, scratch, width);
    const T *sample = x + (size_t)blockIdx.x * width;
    double *outRow = out + (size_t)blockIdx.x * numFreqs;
    int numRepeats = (numFreqs + width - 1) / width;

    for (int repeat = 0; repeat < numRepeats; repeat++)
    {
        int first = repeat * width;
        int active = min(width, numFreqs - first);
        for (int d = 0; d < degree; d++)
        {
            loadRow(row, sample, width);
            sorfInPlace(row, tile, radem, rademRowLen, 3 * d, repeat, width, norm);
            for (int j = threadIdx.x; j < active; j += blockDim.x)
            {
                int f = first + j;
                double projected = (double)row[j] * (double)chi[(size_t)d * numFreqs + f];
                outRow[f] = d == 0 ? projected : outRow[f] * projected;
            }
            __syncthreads();
        }
    }
    for (int f = threadIdx.x; f < numFreqs; f += blockDim.x)
        outRow[f] *= scale;
}

template <typename T>
__device__ void convRbfFeatures(const T *x, const int *seqlengths, const signed char *radem,
                                const T *chi, double *out, double *grad, T *scratch, int seqLen,
                                int dim, int convWidth, int width, int rademRowLen, int numFreqs,
                                double sigma, double scale, int averaging, T norm, int withGrad)
{
    T *tile = sharedTile<T>();
    T *row = workRow(tile, scratch, width);
    const T *sample = x + (size_t)blockIdx.x * seqLen * dim;
    double *outRow = out + (size_t)blockIdx.x * 2 * numFreqs;
    double *gradRow = grad + (size_t)blockIdx.x * 2 * numFreqs;
    int windows = seqlengths[blockIdx.x] - convWidth + 1;
    int numRepeats = (numFreqs + width - 1) / width;

    for (int f = threadIdx.x; f < 2 * numFreqs; f += blockDim.x)
    {
        outRow[f] = 0.0;
        if (withGrad)
            gradRow[f] = 0.0;
    }
    for (int repeat = 0; repeat < numRepeats; repeat++)
    {
        int first = repeat * width;
        int active = min(width, numFreqs - first);
        for (int p = 0; p < windows; p++)
        {
            loadWindow(row, sample, p, dim, convWidth * dim, width);
            sorfInPlace(row, tile, radem, rademRowLen, 0, repeat, width, norm);
            for (int j = threadIdx.x; j < active; j += blockDim.x)
            {
                int f = first + j;
                double projected = (double)row[j] * (double)chi[f];
                double s, c;
                sincos(sigma * projected, &s, &c);
                outRow[2 * f] += c;
                outRow[2 * f + 1] += s;
                if (withGrad)
                {
                    gradRow[2 * f] -= projected * s;
                    gradRow[2 * f + 1] += projected * c;
                }
            }
            __syncthreads();
        }
    }
    double rowScale = scale * averagingFactor(averaging, windows);
    for (int f = threadIdx.x; f < 2 * numFreqs; f += blockDim.x)
    {
        outRow[f] *= rowScale;
        if (withGrad)
            gradRow[f] *= rowScale;
    }
}

template <typename T>
__device__ void convMaxpoolFeatures(const T *x, const int *seqlengths, const signed char *radem,
                                    const T *chi, double *out, double *colSums, T *scratch,
                                    int seqLen, int dim, int convWidth, int width, int rademRowLen,
                                    int numFreqs, int minusMean, T norm)
{
    T *tile = sharedTile<T>();
    T *row = workRow(tile, scratch, width);
    const T *sample = x + (size_t)blockIdx.x * seqLen * dim;
    double *outRow = out + (size_t)blockIdx.x * numFreqs;
    double *sumRow = colSums + (size_t)blockIdx.x * numFreqs;
    int windows = seqlengths[blockIdx.x] - convWidth + 1;
    int numRepeats = (numFreqs + width - 1) / width;

    for (int f = threadIdx.x; f < numFreqs; f += blockDim.x)
    {
        outRow[f] = minusMean ? NEG_INF : 0.0;
        sumRow[f] = 0.0;
    }
    for (int repeat = 0; repeat < numRepeats; repeat++)
    {
        int first = repeat * width;
        int active = min(width, numFreqs - first);
        for (int p = 0; p < windows; p++)
        {
            loadWindow(row, sample, p, dim, convWidth * dim, width);
            sorfInPlace(row, tile, radem, rademRowLen, 0, repeat, width, norm);
            for (int j = threadIdx.x; j < active; j += blockDim.x)
            {
                int f = first + j;
                double value = (double)row[j] * (double)chi[f];
                if (value > outRow[f])
                    outRow[f] = value;
                sumRow[f] += value;
            }
            __syncthreads();
        }
    }
    if (minusMean)
    {
        double invWindows = 1.0 / (double)windows;
        for (int f = threadIdx.x; f < numFreqs; f += blockDim.x)
            outRow[f] -= sumRow[f] * invWindows;
    }
}

// One thread per frequency. The gradient is accumulated group by group so no
// per-thread buffer of numLengthscales entries is needed.
template <typename T>
__device__ void ardFeatures(const T *x, const T *weights, const int *sigmaMap,
                            const double *sigmaVals, double *out, double *grad, int nodes,
                            int dim, int numFreqs, int numLengthscales, double scale, int withGrad)
{
    const T *sample = x + (size_t)blockIdx.x * nodes * dim;
    double *outRow = out + (size_t)blockIdx.x * 2 * numFreqs;
    double *gradRow = grad + (size_t)blockIdx.x * 2 * numFreqs * numLengthscales;

    for (int f = threadIdx.x; f < numFreqs; f += blockDim.x)
    {
        const T *w = weights + (size_t)f * dim;
        double *cosGrad = gradRow + (size_t)(2 * f) * numLengthscales;
        double *sinGrad = gradRow + (size_t)(2 * f + 1) * numLengthscales;
        if (withGrad)
        {
            for (int l = 0; l < numLengthscales; l++)
            {
                cosGrad[l] = 0.0;
                sinGrad[l] = 0.0;
            }
        }
        double cosSum = 0.0;
        double sinSum = 0.0;
        for (int a = 0; a < nodes; a++)
        {
            const T *node = sample + (size_t)a * dim;
            double projected = 0.0;
            for (int m = 0; m < dim; m++)
                projected += sigmaVals[m] * ((double)node[m] * (double)w[m]);
            double s, c;
            sincos(projected, &s, &c);
            cosSum += c;
            sinSum += s;
            if (withGrad)
            {
                for (int l = 0; l < numLengthscales; l++)
                {
                    double partial = 0.0;
                    for (int m = 0; m < dim; m++)
                        if (sigmaMap[m] == l)
                            partial += (double)node[m] * (double)w[m];
                    cosGrad[l] -= s * partial;
                    sinGrad[l] += c * partial;
                }
            }
        }
        outRow[2 * f] = cosSum * scale;
        outRow[2 * f + 1] = sinSum * scale;
        if (withGrad)
        {
            for (int l = 0; l < numLengthscales; l++)
            {
                cosGrad[l] *= scale;
                sinGrad[l] *= scale;
            }
        }
    }
}

#define RF_ENTRY_POINTS(T, SUFFIX)                                                              \
    extern "C" __global__ void rbf_features_##SUFFIX(                                           \
        const T *x, const signed char *radem, const T *chi, double *out, double *grad,          \
        T *scratch, int width, int rademRowLen, int numFreqs, double sigma, double scale,        \
        T norm, int withGrad)                                                                   \
    {                                                                                           \
        rbfFeatures<T>(x, radem, chi, out, grad, scratch, width, rademRowLen, numFreqs, sigma,  \
                       scale, norm, withGrad);                                                  \
    }                                                                                           \
    extern "C" __global__ void arccos_features_##SUFFIX(                                        \
        const T *x, const signed char *radem, const T *chi, double *out, T *scratch, int width, \
        int rademRowLen, int numFreqs, int kernelOrder, double scale, T norm)                   \
    {                                                                                           \
        arccosFeatures<T>(x, radem, chi, out, scratch, width, rademRowLen, numFreqs,            \
                          kernelOrder, scale, norm);                                            \
    }                                                                                           \
    extern "C" __global__ void poly_features_##SUFFIX(                                          \
        const T *x, const signed char *radem, const T *chi, double *out, T *scratch, int width, \
        int rademRowLen, int numFreqs, int degree, double scale, T norm)                        \
    {                                                                                           \
        polyFeatures<T>(x, radem, chi, out, scratch, width, rademRowLen, numFreqs, degree,      \
                        scale, norm);                                                           \
    }                                                                                           \
    extern "C" __global__ void conv_rbf_features_##SUFFIX(                                      \
        const T *x, const int *seqlengths, const signed char *radem, const T *chi, double *out, \
        double *grad, T *scratch, int seqLen, int dim, int convWidth, int width,                \
        int rademRowLen, int numFreqs, double sigma, double scale, int averaging, T norm,       \
        int withGrad)                                                                           \
    {                                                                                           \
        convRbfFeatures<T>(x, seqlengths, radem, chi, out, grad, scratch, seqLen, dim,          \
                           convWidth, width, rademRowLen, numFreqs, sigma, scale, averaging,    \
                           norm, withGrad);                                                     \
    }                                                                                           \
    extern "C" __global__ void conv_maxpool_features_##SUFFIX(                                  \
        const T *x, const int *seqlengths, const signed char *radem, const T *chi, double *out, \
        double *colSums, T *scratch, int seqLen, int dim, int convWidth, int width,             \
        int rademRowLen, int numFreqs, int minusMean, T norm)                                   \
    {                                                                                           \
        convMaxpoolFeatures<T>(x, seqlengths, radem, chi, out, colSums, scratch, seqLen, dim,   \
                               convWidth, width, rademRowLen, numFreqs, minusMean, norm);       \
    }                                                                                           \
    extern "C" __global__ void ard_features_##SUFFIX(                                           \
        const T *x, const T *weights, const int *sigmaMap, const double *sigmaVals,             \
        double *out, double *grad, int nodes, int dim, int numFreqs, int numLengthscales,       \
        double scale, int withGrad)                                                             \
    {                                                                                           \
        ardFeatures<T>(x, weights, sigmaMap, sigmaVals, out, grad, nodes, dim, numFreqs,        \
                       numLengthscales, scale, withGrad);                                       \
    }

RF_ENTRY_POINTS(float, float)
RF_ENTRY_POINTS(double, double)
"#,
    funcs: &[
        "rbf_features",
        "arccos_features",
        "poly_features",
        "conv_rbf_features",
        "conv_maxpool_features",
        "ard_features",
    ],
};
