use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    cache::CacheStats,
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        cache::{CacheClearResult, CacheFlushResult, CacheWarmResult, ClearCacheRequest},
        cart::{AddToCartRequest, CartDto, CartItemDto, UpdateCartItemRequest},
        categories::{CategoryList, CategoryWithCount, CreateCategoryRequest, UpdateCategoryRequest},
        orders::{
            AdminOrderList, AdminOrderRow, BulkUpdateOrderStatusRequest, BulkUpdateResult,
            CheckoutRequest, OrderList, OrderStats, OrderWithItems, UpdateOrderStatusRequest,
            UpdatePaymentStatusRequest,
        },
        products::{
            CreateProductRequest, ProductDetail, ProductImagePayload, ProductList,
            UpdateProductRequest,
        },
        users::{ChangePasswordRequest, UpdateProfileRequest, UserList, UserProfile},
    },
    models::{
        Cart, CartItem, Category, Order, OrderItem, OrderStatusHistory, Product, ProductImage,
        User,
    },
    response::{ApiResponse, Meta},
    routes::{admin, auth, cart, categories, health, orders, params, products, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        users::get_profile,
        users::update_profile,
        users::change_password,
        categories::list_categories,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        cart::get_cart,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_cart_item,
        cart::clear_cart,
        orders::list_orders,
        orders::checkout,
        orders::get_order,
        orders::cancel_order,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::update_payment_status,
        admin::bulk_update_order_status,
        admin::order_stats,
        admin::list_low_stock,
        admin::adjust_inventory,
        admin::list_users,
        admin::cache_stats,
        admin::clear_cache,
        admin::flush_cache,
        admin::warm_cache
    ),
    components(
        schemas(
            User,
            Category,
            Product,
            ProductImage,
            Cart,
            CartItem,
            Order,
            OrderItem,
            OrderStatusHistory,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            UserProfile,
            UpdateProfileRequest,
            ChangePasswordRequest,
            UserList,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CategoryWithCount,
            CategoryList,
            CreateProductRequest,
            UpdateProductRequest,
            ProductImagePayload,
            ProductList,
            ProductDetail,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartItemDto,
            CartDto,
            CheckoutRequest,
            UpdateOrderStatusRequest,
            UpdatePaymentStatusRequest,
            OrderList,
            OrderWithItems,
            AdminOrderRow,
            AdminOrderList,
            OrderStats,
            BulkUpdateOrderStatusRequest,
            BulkUpdateResult,
            CacheStats,
            ClearCacheRequest,
            CacheClearResult,
            CacheFlushResult,
            CacheWarmResult,
            admin::InventoryAdjustRequest,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::AdminOrderListQuery,
            params::LowStockQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<ProductDetail>,
            ApiResponse<CategoryList>,
            ApiResponse<CartDto>,
            ApiResponse<OrderList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<AdminOrderList>,
            ApiResponse<OrderStats>,
            ApiResponse<BulkUpdateResult>,
            ApiResponse<CacheStats>,
            ApiResponse<CacheClearResult>,
            ApiResponse<CacheFlushResult>,
            ApiResponse<CacheWarmResult>,
            ApiResponse<UserProfile>,
            ApiResponse<UserList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Users", description = "Account endpoints"),
        (name = "Categories", description = "Category endpoints"),
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
