use crate::mapping::FieldMapping;

/// Static description of one sheet-backed entity.
#[derive(Debug, Clone, Copy)]
pub struct EntitySpec {
    pub sheet: &'static str,
    pub mapping: FieldMapping,
    pub id_field: &'static str,
    pub id_prefix: &'static str,
    /// `false` means rows are never physically removed.
    pub deletable: bool,
    /// Status written to `trangThai` when a non-deletable row is removed.
    /// `None` means the entity cannot be removed at all.
    pub cancel_status: Option<&'static str>,
}

pub const CANCELLED: &str = "Hủy";

pub const CUSTOMER: EntitySpec = EntitySpec {
    sheet: "Khách hàng",
    mapping: FieldMapping {
        columns: &[
            ("Mã KH", "maKhachHang"),
            ("Họ và tên ", "hoVaTen"),
            ("Tên thường gọi", "tenThuongGoi"),
            ("Số điện thoại", "soDienThoai"),
            ("Email", "email"),
            ("Ngày sinh", "ngaySinh"),
            ("Giới tính", "gioiTinh"),
            ("Địa chỉ", "diaChi"),
            ("Tiền sử bệnh", "tienSuBenh"),
            ("Ghi chú", "ghiChu"),
            ("Ngày tạo", "ngayTao"),
            ("Trạng thái ", "trangThai"),
            ("Người giới thiệu", "nguoiGioiThieu"),
        ],
        phone_field: Some("soDienThoai"),
    },
    id_field: "maKhachHang",
    id_prefix: "KH",
    deletable: true,
    cancel_status: None,
};

pub const PRODUCT: EntitySpec = EntitySpec {
    sheet: "Sản phẩm",
    mapping: FieldMapping {
        columns: &[
            ("Mã SP", "maSanPham"),
            ("Tên sản phẩm", "tenSanPham"),
            ("Loại sản phẩm", "loaiSanPham"),
            ("Đơn vị", "donVi"),
            ("Giá nhập", "giaNhap"),
            ("Giá bán", "giaBan"),
            ("Số lượng tồn", "soLuongTon"),
            ("Mô tả", "moTa"),
            ("Trạng thái", "trangThai"),
        ],
        phone_field: None,
    },
    id_field: "maSanPham",
    id_prefix: "SP",
    deletable: true,
    cancel_status: None,
};

pub const SERVICE: EntitySpec = EntitySpec {
    sheet: "Dịch vụ",
    mapping: FieldMapping {
        columns: &[
            ("Mã DV", "maDichVu"),
            ("Tên dịch vụ", "tenDichVu"),
            ("Loại dịch vụ", "loaiDichVu"),
            ("Thời gian", "thoiGian"),
            ("Giá dịch vụ", "giaDichVu"),
            ("Mô tả", "moTa"),
            ("Lợi ích", "loiIch"),
            ("Trạng thái", "trangThai"),
        ],
        phone_field: None,
    },
    id_field: "maDichVu",
    id_prefix: "DV",
    deletable: true,
    cancel_status: None,
};

pub const ORDER: EntitySpec = EntitySpec {
    sheet: "Đơn hàng",
    mapping: FieldMapping {
        columns: &[
            ("Mã đơn", "maDonHang"),
            ("Mã KH", "maKhachHang"),
            ("Tên khách hàng", "tenKhachHang"),
            ("Ngày tạo", "ngayTao"),
            ("Danh sách sản phẩm", "danhSachSanPham"),
            ("Tổng tiền", "tongTien"),
            ("Giảm giá", "giamGia"),
            ("Thành tiền", "thanhTien"),
            ("Phương thức thanh toán", "phuongThucThanhToan"),
            ("Trạng thái thanh toán", "trangThaiThanhToan"),
            ("Ghi chú", "ghiChu"),
            ("Nhân viên tạo", "nhanVienTao"),
        ],
        phone_field: None,
    },
    id_field: "maDonHang",
    id_prefix: "DH",
    deletable: false,
    cancel_status: None,
};

pub const TREATMENT_PLAN: EntitySpec = EntitySpec {
    sheet: "Liệu trình",
    mapping: FieldMapping {
        columns: &[
            ("Mã liệu trình", "maLieuTrinh"),
            ("Mã KH", "maKhachHang"),
            ("Tên khách hàng", "tenKhachHang"),
            ("Tên liệu trình", "tenLieuTrinh"),
            ("Ngày bắt đầu", "ngayBatDau"),
            ("Ngày kết thúc", "ngayKetThuc"),
            ("Danh sách dịch vụ", "danhSachDichVu"),
            ("Danh sách sản phẩm", "danhSachSanPham"),
            ("Số buổi", "soBuoi"),
            ("Số buổi đã thực hiện", "soBuoiDaThucHien"),
            ("Tổng tiền", "tongTien"),
            ("Đã thanh toán", "daThanhToan"),
            ("Còn lại", "conLai"),
            ("Trạng thái thanh toán", "trangThaiThanhToan"),
            ("Trạng thái", "trangThai"),
            ("Ghi chú", "ghiChu"),
            ("Nhân viên tư vấn", "nhanVienTuVan"),
        ],
        phone_field: None,
    },
    id_field: "maLieuTrinh",
    id_prefix: "LT",
    deletable: false,
    cancel_status: None,
};

pub const TREATMENT_SESSION: EntitySpec = EntitySpec {
    sheet: "Lượt trị liệu",
    mapping: FieldMapping {
        columns: &[
            ("Mã lượt", "maLuot"),
            ("Mã liệu trình", "maLieuTrinh"),
            ("Mã KH", "maKhachHang"),
            ("Tên khách hàng", "tenKhachHang"),
            ("Ngày thực hiện", "ngayThucHien"),
            ("Giờ bắt đầu", "gioBatDau"),
            ("Giờ kết thúc", "gioKetThuc"),
            ("Dịch vụ thực hiện", "dichVuThucHien"),
            ("Nhân viên thực hiện", "nhanVienThucHien"),
            ("Đánh giá", "danhGia"),
            ("Ghi chú", "ghiChu"),
            ("Trạng thái", "trangThai"),
        ],
        phone_field: None,
    },
    id_field: "maLuot",
    id_prefix: "BT",
    deletable: false,
    cancel_status: Some(CANCELLED),
};

pub const STAFF: EntitySpec = EntitySpec {
    sheet: "Nhân viên",
    mapping: FieldMapping {
        columns: &[
            ("Mã NV", "maNhanVien"),
            ("Họ và tên", "hoVaTen"),
            ("Số điện thoại", "soDienThoai"),
            ("Email", "email"),
            ("Chức vụ", "chucVu"),
            ("Chuyên môn", "chuyenMon"),
            ("Ngày vào làm", "ngayVaoLam"),
            ("Quyền hạn", "quyenHan"),
            ("Trạng thái", "trangThai"),
            ("Hoa hồng %", "hoaHong"),
            ("Ngân hàng", "nganHang"),
            ("Số TK", "soTK"),
        ],
        phone_field: Some("soDienThoai"),
    },
    id_field: "maNhanVien",
    id_prefix: "NV",
    deletable: true,
    cancel_status: None,
};

pub const TRANSACTION: EntitySpec = EntitySpec {
    sheet: "Giao dịch",
    mapping: FieldMapping {
        columns: &[
            ("Mã GD", "maGiaoDich"),
            ("Loại GD", "loaiGiaoDich"),
            ("Mã tham chiếu", "maThamChieu"),
            ("Mã KH", "maKhachHang"),
            ("Tên khách hàng", "tenKhachHang"),
            ("Số tiền", "soTien"),
            ("Phương thức", "phuongThuc"),
            ("Ngày GD", "ngayGiaoDich"),
            ("Nội dung", "noiDung"),
            ("Trạng thái", "trangThai"),
            ("Nhân viên xử lý", "nhanVienXuLy"),
        ],
        phone_field: None,
    },
    id_field: "maGiaoDich",
    id_prefix: "GD",
    deletable: false,
    cancel_status: None,
};

pub const ALL: [EntitySpec; 8] = [
    CUSTOMER,
    PRODUCT,
    SERVICE,
    ORDER,
    TREATMENT_PLAN,
    TREATMENT_SESSION,
    STAFF,
    TRANSACTION,
];
